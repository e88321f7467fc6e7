//! Java `.properties` files.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text::{self, Line};
use crate::{Format, FormatAdapter, FormatContext, FormatResult, ParsedResource, Unit};
use locsync_types::Message;

const RULES: &[Rule] = &[Rule::Brace, Rule::Printf];

pub(crate) struct Properties;

fn is_comment(line: &Line<'_>) -> bool {
    let c = line.content.trim_start();
    c.starts_with('#') || c.starts_with('!')
}

/// True if the line ends with an odd number of backslashes.
fn continues(content: &str) -> bool {
    content.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

pub(crate) fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
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
            None => {}
        }
    }
    out
}

fn escape_value(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ' ' if i == 0 => out.push_str("\\ "),
            c => out.push(c),
        }
    }
    out
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        match c {
            ' ' | '=' | ':' | '\\' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

/// Joins a logical line, dropping `\`-newline and leading indentation of
/// continuation lines.
fn logical(lines: &[Line<'_>]) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let content = if i == 0 {
            line.content
        } else {
            line.content.trim_start()
        };
        if i + 1 < lines.len() {
            out.push_str(&content[..content.len() - 1]);
        } else {
            out.push_str(content);
        }
    }
    out
}

/// Splits a logical line into unescaped key and the raw value offset.
fn split_entry(line: &str) -> (String, usize) {
    let bytes = line.as_bytes();
    let mut i = line.len() - line.trim_start().len();
    let key_start = i;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'=' | b':' | b' ' | b'\t' | b'\x0c' => break,
            _ => i += 1,
        }
    }
    let i = i.min(bytes.len());
    let key = unescape(&line[key_start..i]);
    let mut j = i;
    while j < bytes.len() && matches!(bytes[j], b' ' | b'\t' | b'\x0c') {
        j += 1;
    }
    if j < bytes.len() && matches!(bytes[j], b'=' | b':') {
        j += 1;
        while j < bytes.len() && matches!(bytes[j], b' ' | b'\t' | b'\x0c') {
            j += 1;
        }
    }
    (key, j)
}

impl FormatAdapter for Properties {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let lines = text::lines(text);
        let mut resource = ParsedResource::new(Format::Properties);
        let mut comment: Vec<String> = Vec::new();
        let mut comment_start: Option<usize> = None;
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            if line.is_blank() {
                if let Some(start) = comment_start.take() {
                    resource.push_raw(&text[start..line.start]);
                }
                comment.clear();
                resource.push_raw(&text[line.start..line.end]);
                i += 1;
                continue;
            }
            if is_comment(&line) {
                let body = line.content.trim_start();
                comment.push(text::comment_body(body, &body[..1]).to_string());
                comment_start.get_or_insert(line.start);
                i += 1;
                continue;
            }
            let first = i;
            while i < lines.len() && continues(lines[i].content) && i + 1 < lines.len() {
                i += 1;
            }
            i += 1;
            let block = &lines[first..i];
            let start = comment_start.take().unwrap_or(line.start);
            let end = block[block.len() - 1].end;
            let logical_line = logical(block);
            let (key, value_offset) = split_entry(&logical_line);
            let value = unescape(&logical_line[value_offset..]);
            // The value span maps onto raw text only for single-line entries.
            let value_range = (block.len() == 1).then(|| {
                let abs = line.start + value_offset;
                (abs - start)..(line.content_end() - start)
            });
            let unit = Unit::parsed(
                key,
                Message::from_pattern(placeholders::pattern(&value, RULES)),
                RawSpan::new(&text[start..end], value_range),
            )
            .with_comment(text::join_comment(&comment));
            comment.clear();
            resource.push_parsed(unit);
        }
        if let Some(start) = comment_start {
            resource.push_raw(&text[start..]);
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        text::render_flat(&unit.value.pattern, &escape_value)
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let mut out = String::new();
        if let Some(comment) = &unit.comment {
            for line in comment.lines() {
                out.push_str(&format!("# {line}\n"));
            }
        }
        out.push_str(&format!(
            "{} = {}\n",
            escape_key(&unit.key),
            self.render_value(unit, ctx)
        ));
        out
    }
}
