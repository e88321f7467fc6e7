//! Android `strings.xml` resources.
//!
//! Handles `<string>` and `<plurals>` children of `<resources>`. Strings
//! marked `translatable="false"` and all other elements stay raw. Inline
//! markup inside values is kept as verbatim placeholders.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::xml;
use crate::{Format, FormatAdapter, FormatContext, FormatError, FormatResult, ParsedResource, Unit};
use locsync_types::{Message, Pattern, PluralCategory, Select, Variant, VariantKey};
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

const RULES: &[Rule] = &[Rule::Printf];
const FORMAT: Format = Format::AndroidXml;

pub(crate) struct AndroidXml;

fn unescape_android(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let mut lookahead = chars.clone();
                match text::hex_char(&mut lookahead, 4) {
                    Some(decoded) => {
                        out.push(decoded);
                        chars = lookahead;
                    }
                    None => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn escape_android(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '@' | '?' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    xml::escape_text(&out)
}

fn value_pattern(raw: &str) -> Pattern {
    placeholders::markup_pattern(raw, RULES, &|t: &str| unescape_android(&xml::unescape(t)))
}

fn render_pattern(pattern: &Pattern) -> String {
    text::render_flat(pattern, &escape_android)
}

fn plural_items(select: &Select, ctx: &FormatContext) -> Vec<(String, Pattern)> {
    match &ctx.locale {
        Some(locale) => locale
            .plural_categories
            .iter()
            .filter_map(|category| {
                select
                    .variant(category.as_str())
                    .map(|p| (category.as_str().to_string(), p.clone()))
            })
            .collect(),
        None => select
            .variants
            .iter()
            .map(|v| (v.key.label().to_string(), v.value.clone()))
            .collect(),
    }
}

impl FormatAdapter for AndroidXml {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let mut reader = Reader::from_str(text);
        let mut resource = ParsedResource::new(FORMAT);
        let mut cursor = 0;
        let mut depth = 0usize;
        let mut closing = None;
        let mut comment: Option<String> = None;
        let err = |pos: usize, e: &dyn std::fmt::Display| FormatError::at(FORMAT, text, pos, e.to_string());
        loop {
            let start = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(|e| err(start, &e))?;
            match event {
                Event::Eof => break,
                Event::Comment(_) => {
                    let end = reader.buffer_position() as usize;
                    let body = text[start..end].trim_start_matches("<!--").trim_end_matches("-->");
                    comment = Some(body.trim().to_string());
                }
                Event::Start(e) if depth == 1 && e.name().as_ref() == b"string" => {
                    let key = xml::attribute(FORMAT, text, start, &e, "name")?;
                    let translatable = xml::attribute(FORMAT, text, start, &e, "translatable")?;
                    let span = reader
                        .read_to_end(QName(b"string"))
                        .map_err(|e| err(start, &e))?;
                    let end = reader.buffer_position() as usize;
                    let Some(key) = key.filter(|_| translatable.as_deref() != Some("false")) else {
                        comment = None;
                        continue;
                    };
                    let (inner_start, inner_end) = (span.start as usize, span.end as usize);
                    resource.push_raw(&text[cursor..start]);
                    let unit = Unit::parsed(
                        key,
                        Message::from_pattern(value_pattern(&text[inner_start..inner_end])),
                        RawSpan::new(
                            &text[start..end],
                            Some((inner_start - start)..(inner_end - start)),
                        ),
                    )
                    .with_comment(comment.take());
                    resource.push_parsed(unit);
                    cursor = end;
                }
                Event::Empty(e) if depth == 1 && e.name().as_ref() == b"string" => {
                    let end = reader.buffer_position() as usize;
                    let key = xml::attribute(FORMAT, text, start, &e, "name")?;
                    let translatable = xml::attribute(FORMAT, text, start, &e, "translatable")?;
                    if let Some(key) = key.filter(|_| translatable.as_deref() != Some("false")) {
                        resource.push_raw(&text[cursor..start]);
                        let unit = Unit::parsed(key, Message::default(), RawSpan::new(&text[start..end], None))
                            .with_comment(comment.take());
                        resource.push_parsed(unit);
                        cursor = end;
                    }
                }
                Event::Start(e) if depth == 1 && e.name().as_ref() == b"plurals" => {
                    let key = xml::attribute(FORMAT, text, start, &e, "name")?
                        .ok_or_else(|| FormatError::at(FORMAT, text, start, "plurals without a name"))?;
                    let mut variants = Vec::new();
                    loop {
                        let item_start = reader.buffer_position() as usize;
                        match reader.read_event().map_err(|e| err(item_start, &e))? {
                            Event::Start(item) if item.name().as_ref() == b"item" => {
                                let quantity = xml::attribute(FORMAT, text, item_start, &item, "quantity")?
                                    .unwrap_or_else(|| PluralCategory::Other.as_str().to_string());
                                let span = reader
                                    .read_to_end(QName(b"item"))
                                    .map_err(|e| err(item_start, &e))?;
                                let inner = &text[span.start as usize..span.end as usize];
                                variants.push(Variant::new(VariantKey::key(quantity), value_pattern(inner)));
                            }
                            Event::End(end) if end.name().as_ref() == b"plurals" => break,
                            Event::Eof => {
                                return Err(FormatError::at(FORMAT, text, start, "unterminated plurals"));
                            }
                            _ => {}
                        }
                    }
                    let end = reader.buffer_position() as usize;
                    resource.push_raw(&text[cursor..start]);
                    let unit = Unit::parsed(key, Message::plural(variants), RawSpan::new(&text[start..end], None))
                        .with_comment(comment.take());
                    resource.push_parsed(unit);
                    cursor = end;
                }
                Event::Start(_) => {
                    depth += 1;
                    comment = None;
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        closing = Some(start);
                    }
                }
                Event::Text(_) => {}
                _ => comment = None,
            }
        }
        xml::push_tail(&mut resource, text, cursor, closing);
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        render_pattern(&unit.value.pattern)
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let (pad, newline) = if unit.raw.is_some() { ("", "") } else { ("    ", "\n") };
        let mut out = String::new();
        if unit.raw.is_none() {
            if let Some(comment) = &unit.comment {
                out.push_str(&format!("{pad}<!-- {comment} -->\n"));
            }
        }
        let name = xml::escape_attr(&unit.key);
        match unit.value.as_plural() {
            Some(select) => {
                out.push_str(&format!("{pad}<plurals name=\"{name}\">"));
                for (quantity, pattern) in plural_items(select, ctx) {
                    out.push_str(&format!(
                        "\n        <item quantity=\"{quantity}\">{}</item>",
                        render_pattern(&pattern)
                    ));
                }
                out.push_str("\n    </plurals>");
            }
            None => out.push_str(&format!(
                "{pad}<string name=\"{name}\">{}</string>",
                render_pattern(&unit.value.pattern)
            )),
        }
        out.push_str(newline);
        out
    }
}
