//! `.ini` string tables.
//!
//! Keys in the `[Strings]` section (or before any section) are used as-is;
//! keys of other sections are qualified as `section.key`.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::{Format, FormatAdapter, FormatContext, FormatResult, ParsedResource, Unit};
use locsync_types::Message;

const RULES: &[Rule] = &[Rule::Printf, Rule::Brace];
const STRINGS_SECTION: &str = "Strings";

pub(crate) struct Ini;

impl FormatAdapter for Ini {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let mut resource = ParsedResource::new(Format::Ini);
        let mut section: Option<String> = None;
        let mut comment: Vec<String> = Vec::new();
        let mut comment_start: Option<usize> = None;
        for line in text::lines(text) {
            let content = line.content.trim_start();
            let is_comment = content.starts_with(';') || content.starts_with('#');
            if is_comment {
                comment.push(text::comment_body(content, &content[..1]).to_string());
                comment_start.get_or_insert(line.start);
                continue;
            }
            let entry = (!line.is_blank() && !content.starts_with('['))
                .then(|| content.split_once('='))
                .flatten();
            let Some((key, _)) = entry else {
                if let Some(start) = comment_start.take() {
                    resource.push_raw(&text[start..line.start]);
                }
                comment.clear();
                if let Some(name) = content
                    .strip_prefix('[')
                    .and_then(|s| s.trim_end().strip_suffix(']'))
                {
                    section = Some(name.trim().to_string());
                }
                resource.push_raw(&text[line.start..line.end]);
                continue;
            };
            let key = key.trim();
            let key = match section.as_deref() {
                None | Some(STRINGS_SECTION) => key.to_string(),
                Some(name) => format!("{name}.{key}"),
            };
            let eq = line.content.find('=').map_or(0, |i| i + 1);
            let after = &line.content[eq..];
            let value_start = eq + (after.len() - after.trim_start().len());
            let value = &line.content[value_start..];
            let start = comment_start.take().unwrap_or(line.start);
            let value_range = (line.start + value_start - start)..(line.content_end() - start);
            let unit = Unit::parsed(
                key,
                Message::from_pattern(placeholders::pattern(value, RULES)),
                RawSpan::new(&text[start..line.end], Some(value_range)),
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
        text::render_flat(&unit.value.pattern, &|t: &str| t.to_string())
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        let mut out = String::new();
        if let Some(comment) = &unit.comment {
            for line in comment.lines() {
                out.push_str(&format!("; {line}\n"));
            }
        }
        out.push_str(&format!("{}={}\n", unit.key, self.render_value(unit, ctx)));
        out
    }
}
