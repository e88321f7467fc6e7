//! Project Fluent `.ftl` files.
//!
//! The file is segmented by lines: standalone comments, group comments and
//! blank lines are raw; every message or term, together with the `#`
//! comment directly above it, is one unit. Each entry is parsed with
//! `fluent-syntax` and converted to the canonical message model. Modified
//! entries are re-rendered in canonical Fluent syntax.

use crate::resource::RawSpan;
use crate::text::{self, Line};
use crate::{Format, FormatAdapter, FormatContext, FormatError, FormatResult, ParsedResource, Unit};
use fluent_syntax::ast;
use fluent_syntax::parser;
use locsync_types::{
    Attribute, Message, Pattern, PatternElement, Placeholder, PlaceholderKind, Select, Selector,
    Variant, VariantKey,
};

const INDENT: usize = 4;

pub(crate) struct Ftl;

fn starts_entry(content: &str) -> bool {
    let mut chars = content.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_alphabetic()),
        _ => false,
    }
}

/// Lines that continue the previous entry: indented pattern lines, variant
/// keys, attributes and closing braces.
fn continues_entry(content: &str) -> bool {
    matches!(content.chars().next(), Some(' ' | '}' | '[' | '*' | '.'))
}

/// End index (exclusive) of the entry starting at `first`.
fn entry_end(lines: &[Line<'_>], first: usize) -> usize {
    let mut end = first + 1;
    let mut i = end;
    while i < lines.len() {
        if lines[i].is_blank() {
            i += 1;
            continue;
        }
        if !continues_entry(lines[i].content) {
            break;
        }
        i += 1;
        end = i;
    }
    end
}

fn render_inline(expr: &ast::InlineExpression<&str>) -> String {
    match expr {
        ast::InlineExpression::StringLiteral { value } => format!("\"{value}\""),
        ast::InlineExpression::NumberLiteral { value } => value.to_string(),
        ast::InlineExpression::FunctionReference { id, arguments } => {
            format!("{}{}", id.name, render_arguments(arguments))
        }
        ast::InlineExpression::MessageReference { id, attribute } => match attribute {
            Some(attr) => format!("{}.{}", id.name, attr.name),
            None => id.name.to_string(),
        },
        ast::InlineExpression::TermReference {
            id,
            attribute,
            arguments,
        } => {
            let mut out = format!("-{}", id.name);
            if let Some(attr) = attribute {
                out.push('.');
                out.push_str(attr.name);
            }
            if let Some(arguments) = arguments {
                out.push_str(&render_arguments(arguments));
            }
            out
        }
        ast::InlineExpression::VariableReference { id } => format!("${}", id.name),
        ast::InlineExpression::Placeable { expression } => match expression.as_ref() {
            ast::Expression::Inline(inner) => format!("{{ {} }}", render_inline(inner)),
            ast::Expression::Select { .. } => {
                let mut nested = Pattern::new();
                push_expression(&mut nested, expression);
                render_pattern(&nested)
            }
        },
    }
}

fn render_arguments(arguments: &ast::CallArguments<&str>) -> String {
    let mut parts: Vec<String> = arguments.positional.iter().map(render_inline).collect();
    parts.extend(
        arguments
            .named
            .iter()
            .map(|arg| format!("{}: {}", arg.name.name, render_inline(&arg.value))),
    );
    format!("({})", parts.join(", "))
}

fn placeholder_kind(expr: &ast::InlineExpression<&str>) -> PlaceholderKind {
    match expr {
        ast::InlineExpression::VariableReference { .. } => PlaceholderKind::Variable,
        ast::InlineExpression::MessageReference { .. }
        | ast::InlineExpression::TermReference { .. } => PlaceholderKind::Reference,
        _ => PlaceholderKind::Expression,
    }
}

fn push_expression(pattern: &mut Pattern, expression: &ast::Expression<&str>) {
    match expression {
        ast::Expression::Inline(inline) => {
            pattern.push(PatternElement::Placeholder(Placeholder::new(
                placeholder_kind(inline),
                format!("{{ {} }}", render_inline(inline)),
            )));
        }
        ast::Expression::Select { selector, variants } => {
            let variants = variants
                .iter()
                .map(|v| {
                    let key = if v.default {
                        VariantKey::CatchAll
                    } else {
                        match &v.key {
                            ast::VariantKey::Identifier { name } => VariantKey::key(*name),
                            ast::VariantKey::NumberLiteral { value } => VariantKey::key(*value),
                        }
                    };
                    Variant::new(key, convert_pattern(&v.value))
                })
                .collect();
            pattern.push(PatternElement::Select(Select::new(
                Selector::Expression(render_inline(selector)),
                variants,
            )));
        }
    }
}

fn convert_pattern(pattern: &ast::Pattern<&str>) -> Pattern {
    let mut out = Pattern::new();
    for element in &pattern.elements {
        match element {
            ast::PatternElement::TextElement { value } => out.push_text(value),
            ast::PatternElement::Placeable { expression } => push_expression(&mut out, expression),
        }
    }
    out
}

fn convert_entry(entry: &ast::Entry<&str>) -> Option<(String, Message)> {
    let (key, value, attributes) = match entry {
        ast::Entry::Message(m) => (
            m.id.name.to_string(),
            m.value.as_ref().map(convert_pattern).unwrap_or_default(),
            &m.attributes,
        ),
        ast::Entry::Term(t) => (format!("-{}", t.id.name), convert_pattern(&t.value), &t.attributes),
        _ => return None,
    };
    let mut message = Message::from_pattern(value);
    message.attributes = attributes
        .iter()
        .map(|a| Attribute::new(a.id.name, convert_pattern(&a.value)))
        .collect();
    Some((key, message))
}

/// Parses a single message or term, returning its key and value.
pub(crate) fn parse_entry(source: &str) -> Option<(String, Message)> {
    let resource = parser::parse(source).ok()?;
    match resource.body.as_slice() {
        [entry] => convert_entry(entry),
        _ => None,
    }
}

fn selector_text(selector: &Selector) -> &str {
    match selector {
        Selector::Expression(expr) => expr,
        Selector::Plural => "$count",
    }
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_select(select: &Select) -> String {
    let mut out = format!("{{ {} ->\n", selector_text(&select.selector));
    for variant in &select.variants {
        let marker = if variant.key.is_catch_all() { "   *" } else { "    " };
        let value = render_pattern(&variant.value).replace('\n', &format!("\n{}", " ".repeat(2 * INDENT)));
        out.push_str(&format!("{marker}[{}] {value}\n", variant.key.label()));
    }
    out.push('}');
    out
}

/// Renders a pattern before block indentation is applied.
fn render_pattern(pattern: &Pattern) -> String {
    let mut out = String::new();
    for element in &pattern.elements {
        match element {
            PatternElement::Text(text) => out.push_str(text),
            PatternElement::Placeholder(p) => out.push_str(&p.raw),
            PatternElement::Select(select) => out.push_str(&render_select(select)),
        }
    }
    out
}

fn render_value(body: &str, width: usize) -> String {
    if body.contains('\n') {
        format!("\n{}", indent(body, width))
    } else {
        format!(" {body}")
    }
}

/// Renders a complete entry in canonical Fluent syntax.
pub(crate) fn render_entry(key: &str, comment: Option<&str>, message: &Message) -> String {
    let mut out = String::new();
    if let Some(comment) = comment {
        for line in comment.lines() {
            if line.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str(&format!("# {line}\n"));
            }
        }
    }
    out.push_str(key);
    out.push_str(" =");
    if !message.pattern.elements.is_empty() {
        out.push_str(&render_value(&render_pattern(&message.pattern), INDENT));
    }
    out.push('\n');
    for attribute in &message.attributes {
        out.push_str(&format!(
            "{}.{} ={}\n",
            " ".repeat(INDENT),
            attribute.name,
            render_value(&render_pattern(&attribute.value), 2 * INDENT)
        ));
    }
    out
}

impl FormatAdapter for Ftl {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let lines = text::lines(text);
        let mut resource = ParsedResource::new(Format::Ftl);
        let mut comment: Vec<String> = Vec::new();
        let mut comment_start: Option<usize> = None;
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            let content = line.content;
            if content.starts_with('#') && !content.starts_with("##") {
                comment.push(text::comment_body(content, "#").to_string());
                comment_start.get_or_insert(line.start);
                i += 1;
                continue;
            }
            if !starts_entry(content) {
                if !line.is_blank() && !content.starts_with('#') {
                    return Err(FormatError::parse(Format::Ftl, i + 1, "expected a message or term"));
                }
                if let Some(start) = comment_start.take() {
                    resource.push_raw(&text[start..line.start]);
                }
                comment.clear();
                resource.push_raw(&text[line.start..line.end]);
                i += 1;
                continue;
            }
            let end = entry_end(&lines, i);
            let body_start = line.start;
            let body_end = lines[end - 1].end;
            let (key, message) = parse_entry(&text[body_start..body_end])
                .ok_or_else(|| FormatError::parse(Format::Ftl, i + 1, "invalid Fluent entry"))?;
            let start = comment_start.take().unwrap_or(body_start);
            let unit = Unit::parsed(key, message, RawSpan::new(&text[start..body_end], None))
                .with_comment(text::join_comment(&comment));
            comment.clear();
            resource.push_parsed(unit);
            i = end;
        }
        if let Some(start) = comment_start {
            resource.push_raw(&text[start..]);
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        render_pattern(&unit.value.pattern)
    }

    fn render_unit(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        let mut out = String::new();
        if unit.raw.is_none() {
            out.push('\n');
        }
        out.push_str(&render_entry(&unit.key, unit.comment.as_deref(), &unit.value));
        out
    }

    fn can_splice(&self, _unit: &Unit) -> bool {
        false
    }
}
