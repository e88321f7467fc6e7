//! Mozilla `.lang` files.
//!
//! ```text
//! ## active ##
//! # Comment
//! ;Source string
//! Translated string
//! ```
//!
//! The source string is the key. A translation identical to the source is
//! marked with ` {ok}`; a bare copy of the source means untranslated.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::{Format, FormatAdapter, FormatContext, FormatResult, ParsedResource, Unit, Untranslated};
use locsync_types::Message;

const RULES: &[Rule] = &[Rule::Printf];
const OK_MARKER: &str = "{ok}";
const OK_FLAG: &str = "ok";

pub(crate) struct Lang;

impl FormatAdapter for Lang {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let lines = text::lines(text);
        let mut resource = ParsedResource::new(Format::Lang);
        let mut comment: Vec<String> = Vec::new();
        let mut comment_start: Option<usize> = None;
        let mut i = 0;
        while i < lines.len() {
            let line = lines[i];
            i += 1;
            let content = line.content;
            if content.starts_with('#') && !content.starts_with("##") {
                comment.push(text::comment_body(content, "#").to_string());
                comment_start.get_or_insert(line.start);
                continue;
            }
            let Some(source) = content.strip_prefix(';') else {
                if let Some(start) = comment_start.take() {
                    resource.push_raw(&text[start..line.start]);
                }
                comment.clear();
                resource.push_raw(&text[line.start..line.end]);
                continue;
            };
            let start = comment_start.take().unwrap_or(line.start);
            let translation = lines.get(i).filter(|l| !l.is_blank() && !l.content.starts_with(';'));
            let source_message = Message::from_pattern(placeholders::pattern(source, RULES));
            let (value, flags, end, range) = match translation {
                Some(t) => {
                    i += 1;
                    let (value, flags) = match t.content.trim_end().strip_suffix(OK_MARKER) {
                        Some(v) => (v.trim_end(), vec![OK_FLAG.to_string()]),
                        None if t.content == source => ("", Vec::new()),
                        None => (t.content, Vec::new()),
                    };
                    let range = (t.start - start)..(t.content_end() - start);
                    (value, flags, t.end, Some(range))
                }
                None => ("", Vec::new(), line.end, None),
            };
            let mut unit = Unit::parsed(
                source,
                Message::from_pattern(placeholders::pattern(value, RULES)),
                RawSpan::new(&text[start..end], range),
            )
            .with_source(source_message)
            .with_comment(text::join_comment(&comment));
            unit.flags = flags;
            comment.clear();
            resource.push_parsed(unit);
        }
        if let Some(start) = comment_start {
            resource.push_raw(&text[start..]);
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        let value = text::render_flat(&unit.value.pattern, &|t: &str| t.replace('\n', " "));
        if value.is_empty() {
            unit.key.clone()
        } else if value == unit.key {
            format!("{value} {OK_MARKER}")
        } else {
            value
        }
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let mut out = String::new();
        if unit.raw.is_none() {
            out.push('\n');
        }
        if let Some(comment) = &unit.comment {
            for line in comment.lines() {
                out.push_str(&format!("# {line}\n"));
            }
        }
        out.push_str(&format!(";{}\n{}\n", unit.key, self.render_value(unit, ctx)));
        out
    }

    fn untranslated(&self) -> Untranslated {
        Untranslated::KeepEmpty
    }
}
