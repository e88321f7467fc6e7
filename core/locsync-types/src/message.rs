//! Canonical message representation.
//!
//! Every file format maps its native string syntax into a [`Message`] so that
//! diffing, quality checks and translation memory work on one semantic model
//! rather than on per-format raw text.
//!
//! A message is a [`Pattern`] of text runs, typed placeholders and select
//! expressions. Plurals (gettext `msgstr[n]`, Android `<plurals>`) and Fluent
//! selectors share the same [`Select`] shape. Every select has exactly one
//! catch-all variant whose original label is discarded; it is always rendered
//! as [`CATCH_ALL_LABEL`].

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed label of the catch-all variant.
pub const CATCH_ALL_LABEL: &str = "other";

/// What kind of syntax a placeholder was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// printf-style directive (`%s`, `%1$d`, `%@`).
    Printf,
    /// Java MessageFormat / brace style (`{0}`, `{name}`).
    Brace,
    /// Named variable (Fluent `{ $name }`, WebExtension `$NAME$`).
    Variable,
    /// Entity or message reference (`&brandName;`, Fluent `{ -brand }`).
    Reference,
    /// Any other inline expression kept verbatim.
    Expression,
}

/// A placeholder kept verbatim in its native syntax.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub raw: String,
}

impl Placeholder {
    pub fn new(kind: PlaceholderKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }
}

/// One element of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PatternElement {
    Text(String),
    Placeholder(Placeholder),
    Select(Select),
}

/// A sequence of text, placeholders and selects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern {
    pub elements: Vec<PatternElement>,
}

impl Pattern {
    /// Creates an empty pattern.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pattern holding a single text run.
    pub fn text(text: impl Into<String>) -> Self {
        let mut pattern = Self::new();
        pattern.push_text(&text.into());
        pattern
    }

    /// Splits `text` into text runs and placeholders.
    ///
    /// When several rules match at the same offset the longest match wins.
    pub fn parse_with(text: &str, rules: &[(&Regex, PlaceholderKind)]) -> Self {
        let mut pattern = Self::new();
        let mut pos = 0;
        while pos < text.len() {
            let next = rules
                .iter()
                .filter_map(|(re, kind)| re.find_at(text, pos).map(|m| (m, *kind)))
                .filter(|(m, _)| m.start() < m.end())
                .min_by_key(|(m, _)| (m.start(), std::cmp::Reverse(m.end())));
            match next {
                Some((m, kind)) => {
                    pattern.push_text(&text[pos..m.start()]);
                    pattern
                        .elements
                        .push(PatternElement::Placeholder(Placeholder::new(kind, m.as_str())));
                    pos = m.end();
                }
                None => {
                    pattern.push_text(&text[pos..]);
                    break;
                }
            }
        }
        pattern
    }

    /// Appends text, merging with a trailing text run.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(PatternElement::Text(last)) = self.elements.last_mut() {
            last.push_str(text);
        } else {
            self.elements.push(PatternElement::Text(text.to_string()));
        }
    }

    /// Appends an element, merging adjacent text runs.
    pub fn push(&mut self, element: PatternElement) {
        match element {
            PatternElement::Text(text) => self.push_text(&text),
            other => self.elements.push(other),
        }
    }

    /// True if the pattern renders to nothing.
    pub fn is_empty(&self) -> bool {
        self.elements.iter().all(|e| match e {
            PatternElement::Text(t) => t.is_empty(),
            _ => false,
        })
    }

    /// Returns the single top-level select, if the pattern is exactly one.
    pub fn as_select(&self) -> Option<&Select> {
        match self.elements.as_slice() {
            [PatternElement::Select(select)] => Some(select),
            _ => None,
        }
    }

    /// Flattens the pattern, choosing the catch-all branch of every select.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for element in &self.elements {
            match element {
                PatternElement::Text(t) => out.push_str(t),
                PatternElement::Placeholder(p) => out.push_str(&p.raw),
                PatternElement::Select(s) => {
                    if let Some(v) = s.catch_all() {
                        out.push_str(&v.value.to_plain_text());
                    }
                }
            }
        }
        out
    }

    /// Every full rendering, one per combination of select branches.
    pub fn expand(&self) -> Vec<String> {
        let mut results = vec![String::new()];
        for element in &self.elements {
            match element {
                PatternElement::Text(t) => results.iter_mut().for_each(|r| r.push_str(t)),
                PatternElement::Placeholder(p) => {
                    results.iter_mut().for_each(|r| r.push_str(&p.raw))
                }
                PatternElement::Select(s) => {
                    let tails: Vec<String> =
                        s.variants.iter().flat_map(|v| v.value.expand()).collect();
                    results = results
                        .iter()
                        .flat_map(|head| tails.iter().map(move |tail| format!("{head}{tail}")))
                        .collect();
                }
            }
        }
        results
    }

    /// Placeholders reachable through catch-all branches.
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        let mut out = Vec::new();
        for element in &self.elements {
            match element {
                PatternElement::Placeholder(p) => out.push(p),
                PatternElement::Select(s) => {
                    if let Some(v) = s.catch_all() {
                        out.extend(v.value.placeholders());
                    }
                }
                PatternElement::Text(_) => {}
            }
        }
        out
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain_text())
    }
}

/// What a select chooses on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// The plural category of an implicit count (gettext, Android).
    Plural,
    /// A format-native selector expression, kept verbatim (`$count`).
    Expression(String),
}

/// Label of a select variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKey {
    Key(String),
    CatchAll,
}

impl VariantKey {
    pub fn key(label: impl Into<String>) -> Self {
        Self::Key(label.into())
    }

    /// The label the variant is written with.
    pub fn label(&self) -> &str {
        match self {
            Self::Key(k) => k,
            Self::CatchAll => CATCH_ALL_LABEL,
        }
    }

    pub fn is_catch_all(&self) -> bool {
        matches!(self, Self::CatchAll)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub key: VariantKey,
    pub value: Pattern,
}

impl Variant {
    pub fn new(key: VariantKey, value: Pattern) -> Self {
        Self { key, value }
    }
}

/// A select expression with exactly one catch-all variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Select {
    pub selector: Selector,
    pub variants: Vec<Variant>,
}

impl Select {
    /// Builds a select, normalising the catch-all.
    ///
    /// If no variant is marked catch-all, the one labelled `other` becomes it,
    /// falling back to the last variant. Extra catch-alls keep their position
    /// but are demoted to a regular `other` key.
    pub fn new(selector: Selector, mut variants: Vec<Variant>) -> Self {
        let mut seen = false;
        for v in &mut variants {
            if v.key.is_catch_all() {
                if seen {
                    v.key = VariantKey::key(CATCH_ALL_LABEL);
                }
                seen = true;
            }
        }
        if !seen {
            let idx = variants
                .iter()
                .position(|v| v.key.label() == CATCH_ALL_LABEL)
                .or_else(|| variants.len().checked_sub(1));
            if let Some(idx) = idx {
                variants[idx].key = VariantKey::CatchAll;
            }
        }
        Self { selector, variants }
    }

    /// The catch-all variant.
    pub fn catch_all(&self) -> Option<&Variant> {
        self.variants.iter().find(|v| v.key.is_catch_all())
    }

    /// The variant written with `label` (`"other"` finds the catch-all).
    pub fn variant(&self, label: &str) -> Option<&Pattern> {
        self.variants
            .iter()
            .find(|v| match &v.key {
                VariantKey::Key(k) => k == label,
                VariantKey::CatchAll => false,
            })
            .or_else(|| {
                (label == CATCH_ALL_LABEL)
                    .then(|| self.catch_all())
                    .flatten()
            })
            .map(|v| &v.value)
    }
}

/// A named sub-value of a message (Fluent attributes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: Pattern,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: Pattern) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The canonical, format-independent value of a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub pattern: Pattern,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<Attribute>,
}

impl Message {
    /// A message consisting of plain text.
    pub fn plain(text: impl Into<String>) -> Self {
        Self::from_pattern(Pattern::text(text))
    }

    pub fn from_pattern(pattern: Pattern) -> Self {
        Self {
            pattern,
            attributes: Vec::new(),
        }
    }

    /// A plural message: a single select on the implicit count.
    pub fn plural(variants: Vec<Variant>) -> Self {
        Self::from_pattern(Pattern {
            elements: vec![PatternElement::Select(Select::new(Selector::Plural, variants))],
        })
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: Pattern) -> Self {
        self.attributes.push(Attribute::new(name, value));
        self
    }

    /// True if neither the value nor any attribute renders to anything.
    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty() && self.attributes.iter().all(|a| a.value.is_empty())
    }

    /// The plural select, if this message is exactly one plural select.
    pub fn as_plural(&self) -> Option<&Select> {
        self.pattern
            .as_select()
            .filter(|s| s.selector == Selector::Plural)
    }

    /// Flattened value text (catch-all branches).
    pub fn to_plain_text(&self) -> String {
        self.pattern.to_plain_text()
    }

    /// Every renderable string: all select branches of the value, then of
    /// each attribute.
    pub fn variant_texts(&self) -> Vec<String> {
        let mut texts = if self.pattern.elements.is_empty() {
            Vec::new()
        } else {
            self.pattern.expand()
        };
        for attribute in &self.attributes {
            texts.extend(attribute.value.expand());
        }
        texts
    }

    /// Placeholders of the value and its attributes.
    pub fn placeholders(&self) -> Vec<&Placeholder> {
        let mut out = self.pattern.placeholders();
        for attribute in &self.attributes {
            out.extend(attribute.value.placeholders());
        }
        out
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::plain(text)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_plain_text())
    }
}
