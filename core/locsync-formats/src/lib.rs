//! Format adapters for locsync.
//!
//! Every supported file format is a variant of the closed [`Format`] enum.
//! Parsing produces a [`ParsedResource`]: an ordered list of segments that
//! concatenate back to the exact input bytes. Units carry the canonical
//! [`Message`](locsync_types::Message) of each string next to the raw text it
//! came from, so an unmodified resource serializes byte for byte and a
//! modified one only rewrites the value spans that changed.
//!
//! # Example
//!
//! ```
//! use locsync_formats::{Format, FormatContext};
//! use locsync_types::Message;
//!
//! let ctx = FormatContext::default();
//! let text = "# Greeting\nhello = Hello\nbye = Bye\n";
//! let mut resource = Format::Properties.parse(text.as_bytes(), &ctx).unwrap();
//! assert_eq!(Format::Properties.serialize(&resource, &ctx), text.as_bytes());
//!
//! resource.set_value("bye", Message::plain("Tschüss"));
//! let out = String::from_utf8(Format::Properties.serialize(&resource, &ctx)).unwrap();
//! assert_eq!(out, "# Greeting\nhello = Hello\nbye = Tschüss\n");
//! ```

mod android;
mod apple;
mod dtd;
mod error;
mod ftl;
mod ini;
mod lang;
mod placeholders;
mod po;
mod properties;
mod resource;
mod text;
mod webext;
mod xliff;
mod xml;

pub use error::{FormatError, FormatResult};
pub use resource::{ParsedResource, RawSpan, Segment, Unit};

use locsync_types::{Locale, Message};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const BOM: &str = "\u{feff}";

/// Separator between a gettext `msgctxt` and `msgid`, and between an XLIFF
/// file name and unit id, inside a unit key.
pub const KEY_SEPARATOR: char = '\u{4}';

/// A supported localization file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// gettext `.po` / `.pot`.
    Po,
    /// Java `.properties`.
    Properties,
    /// XML DTD entity files.
    Dtd,
    /// `.ini` files.
    Ini,
    /// Mozilla `.lang` files.
    Lang,
    /// Project Fluent `.ftl`.
    Ftl,
    /// Android `strings.xml`.
    AndroidXml,
    /// WebExtension `messages.json`.
    WebExtJson,
    /// XLIFF 1.2.
    Xliff,
    /// Apple `.strings`.
    AppleStrings,
}

impl Format {
    pub const ALL: [Format; 10] = [
        Self::Po,
        Self::Properties,
        Self::Dtd,
        Self::Ini,
        Self::Lang,
        Self::Ftl,
        Self::AndroidXml,
        Self::WebExtJson,
        Self::Xliff,
        Self::AppleStrings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Po => "po",
            Self::Properties => "properties",
            Self::Dtd => "dtd",
            Self::Ini => "ini",
            Self::Lang => "lang",
            Self::Ftl => "ftl",
            Self::AndroidXml => "android-xml",
            Self::WebExtJson => "webext-json",
            Self::Xliff => "xliff",
            Self::AppleStrings => "apple-strings",
        }
    }

    /// Detects the format from a file path.
    ///
    /// `.xml` files are only treated as Android resources and `.json` files
    /// only as WebExtension catalogs when named `messages.json`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "po" | "pot" => Some(Self::Po),
            "properties" => Some(Self::Properties),
            "dtd" => Some(Self::Dtd),
            "ini" => Some(Self::Ini),
            "lang" => Some(Self::Lang),
            "ftl" => Some(Self::Ftl),
            "xml" => Some(Self::AndroidXml),
            "json" if name == "messages.json" => Some(Self::WebExtJson),
            "xliff" | "xlf" => Some(Self::Xliff),
            "strings" => Some(Self::AppleStrings),
            _ => None,
        }
    }

    /// True for formats that store the source string next to the
    /// translation (gettext, XLIFF).
    pub fn is_bilingual(&self) -> bool {
        matches!(self, Self::Po | Self::Xliff)
    }

    fn adapter(self) -> &'static dyn FormatAdapter {
        match self {
            Self::Po => &po::Po,
            Self::Properties => &properties::Properties,
            Self::Dtd => &dtd::Dtd,
            Self::Ini => &ini::Ini,
            Self::Lang => &lang::Lang,
            Self::Ftl => &ftl::Ftl,
            Self::AndroidXml => &android::AndroidXml,
            Self::WebExtJson => &webext::WebExtJson,
            Self::Xliff => &xliff::Xliff,
            Self::AppleStrings => &apple::AppleStrings,
        }
    }

    /// Parses raw file bytes.
    pub fn parse(self, bytes: &[u8], ctx: &FormatContext) -> FormatResult<ParsedResource> {
        let text = std::str::from_utf8(bytes).map_err(|source| FormatError::Encoding {
            format: self,
            source,
        })?;
        let (bom, body) = match text.strip_prefix(BOM) {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let mut resource = self.adapter().parse(body, ctx)?;
        if bom {
            resource.prepend_raw(BOM);
        }
        resource.set_original(text);
        Ok(resource)
    }

    /// Serializes a resource.
    ///
    /// A resource with no modifications returns its original bytes.
    pub fn serialize(self, resource: &ParsedResource, ctx: &FormatContext) -> Vec<u8> {
        if !resource.is_dirty() {
            if let Some(original) = resource.original() {
                return original.as_bytes().to_vec();
            }
        }
        self.adapter().serialize(resource, ctx).into_bytes()
    }

    /// Produces a locale file from `template`.
    ///
    /// The template's structure, comments and ordering are kept. Every unit
    /// whose key has a translation gets it; untranslated units are dropped,
    /// or kept with an empty (bilingual formats) or source (`.lang`) value.
    /// Translated keys the template lacks are appended, using `sources` for
    /// the source side of bilingual formats.
    pub fn merge_with_template(
        self,
        template: &[u8],
        translations: &BTreeMap<String, Message>,
        sources: &BTreeMap<String, Message>,
        ctx: &FormatContext,
    ) -> FormatResult<Vec<u8>> {
        let mut resource = self.parse(template, ctx)?;
        let policy = self.adapter().untranslated();
        let keys: Vec<String> = resource.units().map(|u| u.key.clone()).collect();
        for key in &keys {
            match translations.get(key) {
                Some(message) => {
                    resource.set_value(key, message.clone());
                }
                None => match policy {
                    Untranslated::Remove => {
                        resource.remove_unit(key);
                    }
                    Untranslated::KeepEmpty => {
                        resource.set_value(key, Message::default());
                    }
                },
            }
        }
        for (key, message) in translations {
            if resource.unit(key).is_none() {
                let mut unit = Unit::new(key.clone(), message.clone());
                if self.is_bilingual() {
                    unit.source = sources.get(key).cloned();
                }
                resource.push_unit(unit);
            }
        }
        Ok(self.serialize(&resource, ctx))
    }

    /// Renders `message` the way it appears in a file of this format, for
    /// validation by the quality checker.
    pub fn render_candidate(self, key: &str, message: &Message) -> String {
        match self {
            Self::Ftl => ftl::render_entry(key, None, message),
            _ => message.to_plain_text(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| FormatError::Unsupported(s.to_string()))
    }
}

/// Per-call parsing context.
#[derive(Debug, Clone, Default)]
pub struct FormatContext {
    /// Locale of the file being read or written; drives plural mapping.
    pub locale: Option<Locale>,
}

impl FormatContext {
    pub fn for_locale(locale: Locale) -> Self {
        Self {
            locale: Some(locale),
        }
    }
}

/// What a template merge does with units that have no translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Untranslated {
    Remove,
    KeepEmpty,
}

/// Per-format parse and render hooks.
///
/// Adapters only deal with the native syntax. Splicing modified values into
/// raw spans and appending new units is shared by the resource module.
pub(crate) trait FormatAdapter: Sync {
    fn parse(&self, text: &str, ctx: &FormatContext) -> FormatResult<ParsedResource>;

    /// Native text of a unit's value, written into its raw value span.
    fn render_value(&self, unit: &Unit, ctx: &FormatContext) -> String;

    /// Complete native text of a unit with no usable raw span.
    fn render_unit(&self, unit: &Unit, ctx: &FormatContext) -> String;

    /// Whether a modified unit may be spliced into its raw value span
    /// instead of being rendered from scratch.
    fn can_splice(&self, unit: &Unit) -> bool {
        unit.value.as_plural().is_none()
    }

    fn untranslated(&self) -> Untranslated {
        Untranslated::Remove
    }

    fn serialize(&self, resource: &ParsedResource, ctx: &FormatContext) -> String {
        resource::serialize_segments(self, resource, ctx)
    }
}
