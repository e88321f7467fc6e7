//! XML DTD entity files (`<!ENTITY key "value">`).

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::{Format, FormatAdapter, FormatContext, FormatError, FormatResult, ParsedResource, Unit};
use locsync_types::Message;

const RULES: &[Rule] = &[Rule::EntityRef, Rule::Printf];
const ENTITY_OPEN: &str = "<!ENTITY";

pub(crate) struct Dtd;

fn unescape(value: &str) -> String {
    value.replace("&quot;", "\"").replace("&apos;", "'")
}

fn escape(text: &str, quote: char) -> String {
    match quote {
        '\'' => text.replace('\'', "&apos;"),
        _ => text.replace('"', "&quot;"),
    }
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Scans one `<!ENTITY ...>` declaration starting at `start`.
///
/// Returns `(name, value_range, end)` for general entities and `None` for
/// parameter entities.
fn scan_entity(
    text: &str,
    start: usize,
) -> FormatResult<(Option<(String, std::ops::Range<usize>)>, usize)> {
    let bytes = text.as_bytes();
    let mut i = skip_whitespace(bytes, start + ENTITY_OPEN.len());
    if bytes.get(i) == Some(&b'%') {
        let end = text[i..]
            .find('>')
            .map(|p| i + p + 1)
            .ok_or_else(|| FormatError::at(Format::Dtd, text, start, "unterminated entity"))?;
        return Ok((None, end));
    }
    let name_start = i;
    while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    let name = text[name_start..i].to_string();
    i = skip_whitespace(bytes, i);
    let quote = *bytes
        .get(i)
        .filter(|b| **b == b'"' || **b == b'\'')
        .ok_or_else(|| FormatError::at(Format::Dtd, text, i, "expected quoted entity value"))?;
    let value_start = i + 1;
    let value_end = text[value_start..]
        .find(quote as char)
        .map(|p| value_start + p)
        .ok_or_else(|| FormatError::at(Format::Dtd, text, start, "unterminated entity value"))?;
    let close = skip_whitespace(bytes, value_end + 1);
    if bytes.get(close) != Some(&b'>') {
        return Err(FormatError::at(Format::Dtd, text, close, "expected `>`"));
    }
    if name.is_empty() {
        return Err(FormatError::at(Format::Dtd, text, start, "entity without a name"));
    }
    Ok((Some((name, value_start..value_end)), close + 1))
}

impl FormatAdapter for Dtd {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let mut resource = ParsedResource::new(Format::Dtd);
        let mut comment: Option<String> = None;
        let mut pos = 0;
        while pos < text.len() {
            let rest = &text[pos..];
            let trimmed = rest.trim_start();
            let ws = rest.len() - trimmed.len();
            if ws > 0 {
                resource.push_raw(&rest[..ws]);
                pos += ws;
                continue;
            }
            if trimmed.starts_with("<!--") {
                let end = trimmed
                    .find("-->")
                    .map(|p| p + 3)
                    .ok_or_else(|| FormatError::at(Format::Dtd, text, pos, "unterminated comment"))?;
                comment = Some(trimmed[4..end - 3].trim().to_string());
                resource.push_raw(&trimmed[..end]);
                pos += end;
                continue;
            }
            if trimmed.starts_with(ENTITY_OPEN) {
                let (entity, end) = scan_entity(text, pos)?;
                match entity {
                    Some((key, range)) => {
                        let value = unescape(&text[range.clone()]);
                        let span = RawSpan::new(
                            &text[pos..end],
                            Some((range.start - pos)..(range.end - pos)),
                        );
                        let unit = Unit::parsed(
                            key,
                            Message::from_pattern(placeholders::pattern(&value, RULES)),
                            span,
                        )
                        .with_comment(comment.take());
                        resource.push_parsed(unit);
                    }
                    None => resource.push_raw(&text[pos..end]),
                }
                pos = end;
                continue;
            }
            // Parameter entity references and anything else run to end of line.
            let end = trimmed.find('\n').unwrap_or(trimmed.len());
            resource.push_raw(&trimmed[..end]);
            comment = None;
            pos += end;
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        let quote = unit
            .raw
            .as_ref()
            .and_then(|raw| {
                let range = raw.value_range.as_ref()?;
                raw.text[..range.start].chars().next_back()
            })
            .unwrap_or('"');
        crate::text::render_flat(&unit.value.pattern, &|t: &str| escape(t, quote))
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let mut out = String::new();
        if let Some(comment) = &unit.comment {
            out.push_str(&format!("<!-- {comment} -->\n"));
        }
        out.push_str(&format!(
            "<!ENTITY {} \"{}\">\n",
            unit.key,
            self.render_value(unit, ctx)
        ));
        out
    }
}
