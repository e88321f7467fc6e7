//! gettext PO catalogs.
//!
//! Entries are separated by blank lines. The key of a unit is its `msgid`,
//! prefixed by `msgctxt` and [`KEY_SEPARATOR`] when a context is present.
//! The header entry and obsolete (`#~`) entries are kept as raw text.

use crate::placeholders::{self, Rule};
use crate::resource::RawSpan;
use crate::text::{self, Line};
use crate::{
    Format, FormatAdapter, FormatContext, FormatError, FormatResult, KEY_SEPARATOR, ParsedResource,
    Unit, Untranslated,
};
use locsync_types::{Locale, Message, Pattern, PluralCategory, Select, Variant, VariantKey};
use std::collections::BTreeMap;

const RULES: &[Rule] = &[Rule::Printf];
const FUZZY: &str = "fuzzy";

pub(crate) struct Po;

#[derive(Debug, Clone, Copy)]
enum Field {
    Context,
    Id,
    IdPlural,
    Str(usize),
}

#[derive(Debug, Default)]
struct Entry {
    context: Option<String>,
    msgid: Option<String>,
    msgid_plural: Option<String>,
    msgstr: BTreeMap<usize, String>,
    plural_form: bool,
    comments: Vec<String>,
    flags: Vec<String>,
    value: Option<(usize, usize)>,
}

impl Entry {
    fn field(&mut self, field: Field) -> &mut String {
        match field {
            Field::Context => self.context.get_or_insert_with(String::new),
            Field::Id => self.msgid.get_or_insert_with(String::new),
            Field::IdPlural => self.msgid_plural.get_or_insert_with(String::new),
            Field::Str(n) => self.msgstr.entry(n).or_default(),
        }
    }
}

fn locale_or_default(ctx: &FormatContext) -> Locale {
    ctx.locale.clone().unwrap_or_else(|| Locale::new("en"))
}

fn unquote(s: &str, line: usize) -> FormatResult<String> {
    let inner = s
        .trim()
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| FormatError::parse(Format::Po, line, "expected a quoted string"))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err(FormatError::parse(Format::Po, line, "dangling escape")),
        }
    }
    Ok(out)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}

/// Quotes a string, wrapping at embedded newlines the way msgcat does.
fn quote(text: &str) -> String {
    let pieces: Vec<&str> = text.split_inclusive('\n').collect();
    if pieces.len() <= 1 {
        return format!("\"{}\"", escape(text));
    }
    let mut out = String::from("\"\"");
    for piece in pieces {
        out.push_str("\n\"");
        out.push_str(&escape(piece));
        out.push('"');
    }
    out
}

fn parse_entry(lines: &[Line<'_>], first_line: usize) -> FormatResult<Entry> {
    let mut entry = Entry::default();
    let mut current: Option<Field> = None;
    for (offset, line) in lines.iter().enumerate() {
        let number = first_line + offset;
        let content = line.content.trim_start();
        if content.starts_with("#~") {
            current = None;
            continue;
        }
        if let Some(rest) = content.strip_prefix("#,") {
            entry.flags.extend(
                rest.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from),
            );
            continue;
        }
        if content.starts_with("#.") {
            entry.comments.push(text::comment_body(content, "#.").to_string());
            continue;
        }
        if content.starts_with('#') {
            continue;
        }
        if content.starts_with('"') {
            let field = current
                .ok_or_else(|| FormatError::parse(Format::Po, number, "string without keyword"))?;
            let value = unquote(content, number)?;
            entry.field(field).push_str(&value);
            if let (Field::Str(_), Some(span)) = (field, entry.value.as_mut()) {
                span.1 = line.content_end();
            }
            continue;
        }
        let (keyword, rest) = content
            .split_once(|c: char| c.is_whitespace())
            .ok_or_else(|| FormatError::parse(Format::Po, number, "expected keyword and string"))?;
        let field = match keyword {
            "msgctxt" => Field::Context,
            "msgid" => Field::Id,
            "msgid_plural" => Field::IdPlural,
            "msgstr" => Field::Str(0),
            kw => {
                let index = kw
                    .strip_prefix("msgstr[")
                    .and_then(|s| s.strip_suffix(']'))
                    .and_then(|s| s.parse::<usize>().ok())
                    .ok_or_else(|| {
                        FormatError::parse(Format::Po, number, format!("unknown keyword `{kw}`"))
                    })?;
                entry.plural_form = true;
                Field::Str(index)
            }
        };
        if let Field::Str(_) = field {
            let start = entry.value.map_or(line.start, |(s, _)| s);
            entry.value = Some((start, line.content_end()));
        }
        let value = unquote(rest, number)?;
        entry.field(field).push_str(&value);
        current = Some(field);
    }
    Ok(entry)
}

fn source_message(msgid: &str, plural: Option<&str>) -> Message {
    match plural {
        Some(plural) => Message::plural(vec![
            Variant::new(
                VariantKey::key(PluralCategory::One.as_str()),
                placeholders::pattern(msgid, RULES),
            ),
            Variant::new(VariantKey::CatchAll, placeholders::pattern(plural, RULES)),
        ]),
        None => Message::from_pattern(placeholders::pattern(msgid, RULES)),
    }
}

fn value_message(entry: &Entry, locale: &Locale) -> Message {
    if entry.msgstr.values().all(String::is_empty) {
        return Message::default();
    }
    if !entry.plural_form {
        let text = entry.msgstr.get(&0).map(String::as_str).unwrap_or_default();
        return Message::from_pattern(placeholders::pattern(text, RULES));
    }
    let variants = entry
        .msgstr
        .iter()
        .map(|(index, text)| {
            let key = match locale.plural_category(*index) {
                Some(PluralCategory::Other) => VariantKey::CatchAll,
                Some(category) => VariantKey::key(category.as_str()),
                None => VariantKey::key(index.to_string()),
            };
            Variant::new(key, placeholders::pattern(text, RULES))
        })
        .collect();
    Message::plural(variants)
}

fn plural_text(select: Option<&Select>, locale: &Locale, index: usize) -> Pattern {
    let Some(select) = select else {
        return Pattern::new();
    };
    locale
        .plural_category(index)
        .and_then(|c| select.variant(c.as_str()))
        .or_else(|| select.variant(&index.to_string()))
        .or_else(|| {
            (index + 1 == locale.nplurals())
                .then(|| select.catch_all().map(|v| &v.value))
                .flatten()
        })
        .cloned()
        .unwrap_or_default()
}

fn is_plural(unit: &Unit) -> bool {
    unit.source.as_ref().is_some_and(|s| s.as_plural().is_some()) || unit.value.as_plural().is_some()
}

fn render_msgstr(unit: &Unit, ctx: &FormatContext) -> String {
    let esc = |t: &str| t.to_string();
    if !is_plural(unit) {
        let text = text::render_flat(&unit.value.pattern, &esc);
        return format!("msgstr {}", quote(&text));
    }
    let locale = locale_or_default(ctx);
    let select = unit.value.as_plural();
    (0..locale.nplurals())
        .map(|i| {
            let text = text::render_flat(&plural_text(select, &locale, i), &esc);
            format!("msgstr[{i}] {}", quote(&text))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Splits a unit key into `(msgctxt, msgid)`.
fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once(KEY_SEPARATOR) {
        Some((context, id)) => (Some(context), id),
        None => (None, key),
    }
}

impl FormatAdapter for Po {
    fn parse(&self, text: &str, ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let locale = locale_or_default(ctx);
        let lines = text::lines(text);
        let mut resource = ParsedResource::new(Format::Po);
        let mut i = 0;
        while i < lines.len() {
            if lines[i].is_blank() {
                resource.push_raw(&text[lines[i].start..lines[i].end]);
                i += 1;
                continue;
            }
            let first = i;
            while i < lines.len() && !lines[i].is_blank() {
                i += 1;
            }
            let block = &lines[first..i];
            let (start, end) = (block[0].start, block[block.len() - 1].end);
            let raw = &text[start..end];
            let entry = parse_entry(block, first + 1)?;
            let Some(msgid) = entry.msgid.as_deref() else {
                resource.push_raw(raw);
                continue;
            };
            if msgid.is_empty() && entry.context.is_none() {
                resource.push_raw(raw);
                continue;
            }
            let key = match &entry.context {
                Some(context) => format!("{context}{KEY_SEPARATOR}{msgid}"),
                None => msgid.to_string(),
            };
            let span = RawSpan::new(raw, entry.value.map(|(s, e)| (s - start)..(e - start)));
            let mut unit = Unit::parsed(key, value_message(&entry, &locale), span)
                .with_source(source_message(msgid, entry.msgid_plural.as_deref()))
                .with_comment(text::join_comment(&entry.comments));
            unit.flags = entry.flags;
            resource.push_parsed(unit);
        }
        Ok(resource)
    }

    fn render_value(&self, unit: &Unit, ctx: &FormatContext) -> String {
        render_msgstr(unit, ctx)
    }

    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String {
        if let Some(raw) = &unit.raw {
            if let Some(range) = &raw.value_range {
                // Keep references and translator comments; drop the fuzzy flag.
                let mut out = String::new();
                for line in text::lines(&raw.text[..range.start]) {
                    match line.content.trim_start().strip_prefix("#,") {
                        Some(flags) => {
                            let kept: Vec<&str> = flags
                                .split(',')
                                .map(str::trim)
                                .filter(|f| !f.is_empty() && *f != FUZZY)
                                .collect();
                            if !kept.is_empty() {
                                out.push_str(&format!("#, {}\n", kept.join(", ")));
                            }
                        }
                        None => out.push_str(&raw.text[line.start..line.end]),
                    }
                }
                out.push_str(&render_msgstr(unit, ctx));
                out.push_str(&raw.text[range.end..]);
                return out;
            }
        }
        let mut out = String::from("\n");
        if let Some(comment) = &unit.comment {
            for line in comment.lines() {
                out.push_str(&format!("#. {line}\n"));
            }
        }
        let (context, id) = split_key(&unit.key);
        if let Some(context) = context {
            out.push_str(&format!("msgctxt {}\n", quote(context)));
        }
        let esc = |t: &str| t.to_string();
        match unit.source.as_ref().and_then(Message::as_plural) {
            Some(select) => {
                let singular = select
                    .variant(PluralCategory::One.as_str())
                    .map(|p| text::render_flat(p, &esc))
                    .unwrap_or_else(|| id.to_string());
                let plural = select
                    .catch_all()
                    .map(|v| text::render_flat(&v.value, &esc))
                    .unwrap_or_default();
                out.push_str(&format!("msgid {}\n", quote(&singular)));
                out.push_str(&format!("msgid_plural {}\n", quote(&plural)));
            }
            None => out.push_str(&format!("msgid {}\n", quote(id))),
        }
        out.push_str(&render_msgstr(unit, ctx));
        out.push('\n');
        out
    }

    fn can_splice(&self, unit: &Unit) -> bool {
        !unit.has_flag(FUZZY)
    }

    fn untranslated(&self) -> Untranslated {
        Untranslated::KeepEmpty
    }
}
