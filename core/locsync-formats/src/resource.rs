//! Lossless segment model shared by all adapters.

use crate::{Format, FormatAdapter, FormatContext};
use locsync_types::Message;
use std::ops::Range;

/// Raw text a unit was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSpan {
    /// The unit's exact source bytes, including attached comment lines.
    pub text: String,
    /// Byte range of the native value inside `text`.
    pub value_range: Option<Range<usize>>,
    /// Text placed around a rendered value when `value_range` is an
    /// insertion point rather than an existing value (XLIFF `<target>`).
    pub wrap: Option<(String, String)>,
}

impl RawSpan {
    pub(crate) fn new(text: impl Into<String>, value_range: Option<Range<usize>>) -> Self {
        Self {
            text: text.into(),
            value_range,
            wrap: None,
        }
    }
}

/// One translatable string of a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub key: String,
    /// Source string, for bilingual formats.
    pub source: Option<Message>,
    pub value: Message,
    /// Developer comment.
    pub comment: Option<String>,
    /// Format flags such as gettext `fuzzy`.
    pub flags: Vec<String>,
    /// Raw text, absent for units created after parsing.
    pub raw: Option<RawSpan>,
    original: Option<Message>,
}

impl Unit {
    /// A unit not backed by any file text.
    pub fn new(key: impl Into<String>, value: Message) -> Self {
        Self {
            key: key.into(),
            source: None,
            value,
            comment: None,
            flags: Vec::new(),
            raw: None,
            original: None,
        }
    }

    /// A unit parsed from `raw`; its current value becomes the baseline
    /// for modification tracking.
    pub(crate) fn parsed(key: impl Into<String>, value: Message, raw: RawSpan) -> Self {
        Self {
            original: Some(value.clone()),
            raw: Some(raw),
            ..Self::new(key, value)
        }
    }

    #[must_use]
    pub(crate) fn with_comment(mut self, comment: Option<String>) -> Self {
        self.comment = comment.filter(|c| !c.trim().is_empty());
        self
    }

    #[must_use]
    pub(crate) fn with_source(mut self, source: Message) -> Self {
        self.source = Some(source);
        self
    }

    /// True if the value differs from the parsed value, or the unit is new.
    pub fn is_modified(&self) -> bool {
        self.original.as_ref() != Some(&self.value)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }
}

/// A slice of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Text with no translatable content: whitespace, headers, comments.
    Raw(String),
    Unit(Unit),
}

/// A parsed resource: segments that concatenate to the original text.
#[derive(Debug, Clone)]
pub struct ParsedResource {
    format: Format,
    segments: Vec<Segment>,
    insert_at: Option<usize>,
    original: Option<String>,
    dirty: bool,
}

impl ParsedResource {
    pub(crate) fn new(format: Format) -> Self {
        Self {
            format,
            segments: Vec::new(),
            insert_at: None,
            original: None,
            dirty: false,
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The text this resource was parsed from.
    pub fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// True once any unit was changed, added or removed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn units(&self) -> impl Iterator<Item = &Unit> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Unit(u) => Some(u),
            Segment::Raw(_) => None,
        })
    }

    /// First unit with `key`.
    pub fn unit(&self, key: &str) -> Option<&Unit> {
        self.units().find(|u| u.key == key)
    }

    fn unit_mut(&mut self, key: &str) -> Option<&mut Unit> {
        self.segments.iter_mut().find_map(|s| match s {
            Segment::Unit(u) if u.key == key => Some(u),
            _ => None,
        })
    }

    /// Replaces the value of `key`. Returns false if there is no such unit.
    pub fn set_value(&mut self, key: &str, value: Message) -> bool {
        match self.unit_mut(key) {
            Some(unit) => {
                if unit.value != value {
                    unit.value = value;
                    self.dirty = true;
                }
                true
            }
            None => false,
        }
    }

    /// Appends a unit at the format's insertion point.
    pub fn push_unit(&mut self, unit: Unit) {
        let idx = self.insert_at.unwrap_or(self.segments.len());
        self.segments.insert(idx, Segment::Unit(unit));
        if let Some(at) = self.insert_at.as_mut() {
            *at += 1;
        }
        self.dirty = true;
    }

    /// Removes the first unit with `key`.
    pub fn remove_unit(&mut self, key: &str) -> Option<Unit> {
        let idx = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Unit(u) if u.key == key))?;
        if let Some(at) = self.insert_at.as_mut() {
            if *at > idx {
                *at -= 1;
            }
        }
        self.dirty = true;
        match self.segments.remove(idx) {
            Segment::Unit(unit) => Some(unit),
            Segment::Raw(_) => None,
        }
    }

    /// Appends raw text, merging with a trailing raw segment.
    pub(crate) fn push_raw(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let at_insert_point = self.insert_at == Some(self.segments.len());
        match self.segments.last_mut() {
            Some(Segment::Raw(last)) if !at_insert_point => last.push_str(text),
            _ => self.segments.push(Segment::Raw(text.to_string())),
        }
    }

    pub(crate) fn push_parsed(&mut self, unit: Unit) {
        self.segments.push(Segment::Unit(unit));
    }

    /// Marks the current end as the place new units are inserted.
    pub(crate) fn mark_insert_point(&mut self) {
        self.insert_at = Some(self.segments.len());
    }

    pub(crate) fn prepend_raw(&mut self, text: &str) {
        match self.segments.first_mut() {
            Some(Segment::Raw(first)) => first.insert_str(0, text),
            _ => {
                self.segments.insert(0, Segment::Raw(text.to_string()));
                if let Some(at) = self.insert_at.as_mut() {
                    *at += 1;
                }
            }
        }
    }

    pub(crate) fn set_original(&mut self, text: &str) {
        self.original = Some(text.to_string());
    }
}

/// Concatenates segments, splicing or rendering modified units.
pub(crate) fn serialize_segments<A: FormatAdapter + ?Sized>(
    adapter: &A,
    resource: &ParsedResource,
    ctx: &FormatContext,
) -> String {
    let mut out = String::new();
    for segment in &resource.segments {
        match segment {
            Segment::Raw(text) => out.push_str(text),
            Segment::Unit(unit) => out.push_str(&render_segment(adapter, unit, ctx)),
        }
    }
    out
}

fn render_segment<A: FormatAdapter + ?Sized>(adapter: &A, unit: &Unit, ctx: &FormatContext) -> String {
    let Some(raw) = &unit.raw else {
        return adapter.render_unit(unit, ctx);
    };
    if !unit.is_modified() {
        return raw.text.clone();
    }
    match &raw.value_range {
        Some(range) if adapter.can_splice(unit) => {
            let mut out = String::with_capacity(raw.text.len());
            out.push_str(&raw.text[..range.start]);
            let value = adapter.render_value(unit, ctx);
            match &raw.wrap {
                Some((open, close)) => {
                    out.push_str(open);
                    out.push_str(&value);
                    out.push_str(close);
                }
                None => out.push_str(&value),
            }
            out.push_str(&raw.text[range.end..]);
            out
        }
        _ => adapter.render_unit(unit, ctx),
    }
}
