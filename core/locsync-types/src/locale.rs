//! Locales and CLDR plural categories.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A CLDR plural category.
///
/// The discriminant order matches the numbering used by comma-separated
/// category lists (`"1,5"` is `one, other`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluralCategory {
    Zero,
    One,
    Two,
    Few,
    Many,
    Other,
}

impl PluralCategory {
    /// All categories in CLDR order.
    pub const ALL: [PluralCategory; 6] = [
        Self::Zero,
        Self::One,
        Self::Two,
        Self::Few,
        Self::Many,
        Self::Other,
    ];

    /// Returns the CLDR keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zero => "zero",
            Self::One => "one",
            Self::Two => "two",
            Self::Few => "few",
            Self::Many => "many",
            Self::Other => "other",
        }
    }

    /// Returns the category for a numeric index in a comma-separated list.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl fmt::Display for PluralCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluralCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidPluralCategory(s.to_string()))
    }
}

fn default_plural_categories() -> Vec<PluralCategory> {
    vec![PluralCategory::One, PluralCategory::Other]
}

/// A locale a project is translated into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale {
    /// BCP 47 code, e.g. `"de"` or `"pt-BR"`.
    pub code: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Plural categories in the order gettext `msgstr[n]` indices use them.
    #[serde(default = "default_plural_categories")]
    pub plural_categories: Vec<PluralCategory>,
    /// gettext `Plural-Forms` expression, written into new PO headers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural_rule: Option<String>,
}

impl Locale {
    /// Creates a locale with the English-like `one, other` plural categories.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            name: code.clone(),
            code,
            plural_categories: default_plural_categories(),
            plural_rule: None,
        }
    }

    /// Replaces the plural categories.
    #[must_use]
    pub fn with_plurals(mut self, categories: Vec<PluralCategory>) -> Self {
        self.plural_categories = categories;
        self
    }

    /// Sets the gettext plural rule.
    #[must_use]
    pub fn with_plural_rule(mut self, rule: impl Into<String>) -> Self {
        self.plural_rule = Some(rule.into());
        self
    }

    /// Parses a comma-separated CLDR index list such as `"1,5"`.
    pub fn parse_cldr_plurals(list: &str) -> Result<Vec<PluralCategory>, Error> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>()
                    .ok()
                    .and_then(PluralCategory::from_index)
                    .ok_or_else(|| Error::InvalidPluralCategory(s.to_string()))
            })
            .collect()
    }

    /// Number of plural forms.
    pub fn nplurals(&self) -> usize {
        self.plural_categories.len().max(1)
    }

    /// Category used for gettext plural index `index`.
    pub fn plural_category(&self, index: usize) -> Option<PluralCategory> {
        self.plural_categories.get(index).copied()
    }

    /// gettext plural index of `category`.
    pub fn plural_index(&self, category: PluralCategory) -> Option<usize> {
        self.plural_categories.iter().position(|c| *c == category)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code)
    }
}
