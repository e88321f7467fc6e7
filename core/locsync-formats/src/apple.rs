//! Apple `.strings` files (`"key" = "value";`).

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::{Format, FormatAdapter, FormatContext, FormatError, FormatResult, ParsedResource, Unit};
use locsync_types::Message;
use std::ops::Range;

const RULES: &[Rule] = &[Rule::Printf];

pub(crate) struct AppleStrings;

fn unescape(raw: &str) -> String {
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
            Some('U' | 'u') => {
                let mut lookahead = chars.clone();
                if let Some(decoded) = text::hex_char(&mut lookahead, 4) {
                    out.push(decoded);
                    chars = lookahead;
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

/// Scans a token at `pos`: a quoted string (range of its contents) or a bare
/// identifier. Returns the content range and the offset after the token.
fn scan_token(text: &str, pos: usize) -> FormatResult<(Range<usize>, usize)> {
    let bytes = text.as_bytes();
    if bytes.get(pos) == Some(&b'"') {
        let mut i = pos + 1;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'"' => return Ok(((pos + 1)..i, i + 1)),
                _ => i += 1,
            }
        }
        return Err(FormatError::at(Format::AppleStrings, text, pos, "unterminated string"));
    }
    let mut i = pos;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'.' | b'-')) {
        i += 1;
    }
    if i == pos {
        return Err(FormatError::at(Format::AppleStrings, text, pos, "expected a string"));
    }
    Ok((pos..i, i))
}

fn skip_ws(text: &str, mut pos: usize) -> usize {
    let bytes = text.as_bytes();
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

fn expect(text: &str, pos: usize, byte: u8) -> FormatResult<usize> {
    if text.as_bytes().get(pos) == Some(&byte) {
        Ok(pos + 1)
    } else {
        Err(FormatError::at(
            Format::AppleStrings,
            text,
            pos,
            format!("expected `{}`", byte as char),
        ))
    }
}

impl FormatAdapter for AppleStrings {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let mut resource = ParsedResource::new(Format::AppleStrings);
        let mut comment: Option<String> = None;
        let mut pos = 0;
        while pos < text.len() {
            let next = skip_ws(text, pos);
            if next > pos {
                resource.push_raw(&text[pos..next]);
                pos = next;
                continue;
            }
            let rest = &text[pos..];
            if rest.starts_with("/*") {
                let end = rest.find("*/").map(|p| p + 2).ok_or_else(|| {
                    FormatError::at(Format::AppleStrings, text, pos, "unterminated comment")
                })?;
                comment = Some(rest[2..end - 2].trim().to_string());
                resource.push_raw(&rest[..end]);
                pos += end;
                continue;
            }
            if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                comment = Some(rest[2..end].trim().to_string());
                resource.push_raw(&rest[..end]);
                pos += end;
                continue;
            }
            let start = pos;
            let (key_range, after_key) = scan_token(text, pos)?;
            let eq = expect(text, skip_ws(text, after_key), b'=')?;
            let (value_range, after_value) = scan_token(text, skip_ws(text, eq))?;
            let end = expect(text, skip_ws(text, after_value), b';')?;
            let key = unescape(&text[key_range]);
            let value = unescape(&text[value_range.clone()]);
            let unit = Unit::parsed(
                key,
                Message::from_pattern(placeholders::pattern(&value, RULES)),
                RawSpan::new(
                    &text[start..end],
                    Some((value_range.start - start)..(value_range.end - start)),
                ),
            )
            .with_comment(comment.take());
            resource.push_parsed(unit);
            pos = end;
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        text::render_flat(&unit.value.pattern, &escape)
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let mut out = String::new();
        if unit.raw.is_none() {
            out.push('\n');
        }
        if let Some(comment) = &unit.comment {
            out.push_str(&format!("/* {comment} */\n"));
        }
        out.push_str(&format!(
            "\"{}\" = \"{}\";",
            escape(&unit.key),
            self.render_value(unit, ctx)
        ));
        if unit.raw.is_none() {
            out.push('\n');
        }
        out
    }
}
