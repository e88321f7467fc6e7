//! WebExtension `messages.json` catalogs.
//!
//! The document is re-serialized as a whole (pretty-printed, key order
//! preserved) when any message changes. Fields other than `message`, such
//! as `placeholders`, are carried over untouched.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text;
use crate::{Format, FormatAdapter, FormatContext, FormatResult, ParsedResource, Unit};
use locsync_types::Message;
use serde_json::{Map, Value};

const RULES: &[Rule] = &[Rule::DollarVar];

pub(crate) struct WebExtJson;

fn entry_object(unit: &Unit) -> Map<String, Value> {
    let mut entry = unit
        .raw
        .as_ref()
        .and_then(|raw| serde_json::from_str::<Map<String, Value>>(&raw.text).ok())
        .unwrap_or_default();
    entry.insert(
        "message".to_string(),
        Value::String(text::render_flat(&unit.value.pattern, &|t: &str| t.to_string())),
    );
    if unit.raw.is_none() {
        if let Some(comment) = &unit.comment {
            entry.insert("description".to_string(), Value::String(comment.clone()));
        }
    }
    entry
}

impl FormatAdapter for WebExtJson {
    fn parse(&self, text: &str, _ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let catalog: Map<String, Value> = serde_json::from_str(text)?;
        let mut resource = ParsedResource::new(Format::WebExtJson);
        for (key, entry) in catalog {
            let message = entry.get("message").and_then(Value::as_str).unwrap_or_default();
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .map(String::from);
            let unit = Unit::parsed(
                key,
                Message::from_pattern(placeholders::pattern(message, RULES)),
                RawSpan::new(serde_json::to_string(&entry)?, None),
            )
            .with_comment(description);
            resource.push_parsed(unit);
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        text::render_flat(&unit.value.pattern, &|t: &str| t.to_string())
    }

    fn render_unit(&self, unit: &Unit, _ctx: &FormatContext) -> String {
        let entry = Value::Object(entry_object(unit));
        format!("\"{}\": {entry}", unit.key)
    }

    fn serialize(&self, resource: &ParsedResource, _ctx: &FormatContext) -> String {
        let catalog: Map<String, Value> = resource
            .units()
            .map(|unit| (unit.key.clone(), Value::Object(entry_object(unit))))
            .collect();
        let mut out = serde_json::to_string_pretty(&catalog).unwrap_or_default();
        if resource.original().is_none_or(|o| o.ends_with('\n')) {
            out.push('\n');
        }
        out
    }
}
