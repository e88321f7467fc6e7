//! Quality checks for candidate translations.
//!
//! [`QualityChecker`] validates a candidate against its entity and the
//! rules of the file format it will be written to. Checks never mutate
//! anything; they return [`Finding`]s and the caller decides whether to
//! accept, warn or reject. A rejected candidate is an ordinary outcome,
//! not an error.

use locsync_formats::{Format, FormatContext};
use locsync_model::Entity;
use locsync_types::Message;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

static MAX_LENGTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"MAX_LENGTH:\s*(\d+)").expect("MAX_LENGTH regex should compile"));

/// How serious a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl Severity {
    /// The class name the review front end groups findings by.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Error => "pErrors",
            Self::Warning => "pWarnings",
        }
    }
}

/// The rule that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rule {
    MaxLength,
    Empty,
    Newline,
    Syntax,
    IdMismatch,
    Placeholder,
    Whitespace,
}

/// One problem with a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub rule: Rule,
    pub message: String,
}

impl Finding {
    fn error(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            rule,
            message: message.into(),
        }
    }

    fn warning(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            rule,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity.class(), self.message)
    }
}

/// True if any finding rejects the candidate.
pub fn has_errors(findings: &[Finding]) -> bool {
    findings.iter().any(Finding::is_error)
}

/// The `MAX_LENGTH: n` limit declared in an entity comment.
pub fn max_length(comment: &str) -> Option<usize> {
    MAX_LENGTH
        .captures(comment)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

fn allows_empty(format: Format) -> bool {
    matches!(format, Format::Properties | Format::Dtd | Format::Ini)
}

fn forbids_newlines(format: Format) -> bool {
    matches!(format, Format::Lang | Format::Ini | Format::Properties)
}

/// Stateless, format-aware validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityChecker;

impl QualityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Checks a candidate message for `entity`, to be written as `format`.
    pub fn check(&self, format: Format, entity: &Entity, candidate: &Message) -> Vec<Finding> {
        let mut findings = Vec::new();
        if format == Format::Ftl {
            let rendered = format.render_candidate(&entity.key, candidate);
            if let Err(finding) = reparse_fluent(entity, &rendered) {
                findings.push(finding);
                return findings;
            }
        }
        self.check_common(format, entity, candidate, &mut findings);
        findings
    }

    /// Checks raw candidate text as typed by a translator.
    ///
    /// Fluent candidates are whole serialized entries (`key = value`).
    pub fn check_str(&self, format: Format, entity: &Entity, text: &str) -> Vec<Finding> {
        let mut findings = Vec::new();
        let candidate = if format == Format::Ftl {
            match reparse_fluent(entity, text) {
                Ok(message) => message,
                Err(finding) => {
                    findings.push(finding);
                    return findings;
                }
            }
        } else {
            Message::plain(text)
        };
        self.check_common(format, entity, &candidate, &mut findings);
        findings
    }

    fn check_common(&self, format: Format, entity: &Entity, candidate: &Message, findings: &mut Vec<Finding>) {
        let texts = candidate_texts(candidate);

        if let Some(limit) = entity.comment.as_deref().and_then(max_length) {
            let longest = texts.iter().map(|t| t.chars().count()).max().unwrap_or(0);
            if longest > limit {
                findings.push(Finding::error(
                    Rule::MaxLength,
                    format!("Translation too long: {longest} characters, limit is {limit}"),
                ));
            }
        }

        if candidate.is_empty() && !allows_empty(format) {
            findings.push(Finding::error(Rule::Empty, "Empty translations are not allowed"));
        }

        if forbids_newlines(format) && texts.iter().any(|t| t.contains('\n')) {
            findings.push(Finding::error(Rule::Newline, "Newline characters are not allowed"));
        }

        // A `.lang` line starting with `;` reads back as a source string.
        if format == Format::Lang && texts.iter().any(|t| t.starts_with(';')) {
            findings.push(Finding::error(Rule::Syntax, "Translations cannot start with a semicolon"));
        }

        check_placeholders(entity, candidate, &texts, findings);
        check_whitespace(entity, candidate, findings);
    }
}

/// Every text a candidate can render: plural variants, or the plain text.
fn candidate_texts(message: &Message) -> Vec<String> {
    let texts = message.variant_texts();
    if texts.is_empty() {
        vec![message.to_plain_text()]
    } else {
        texts
    }
}

fn reparse_fluent(entity: &Entity, text: &str) -> Result<Message, Finding> {
    let mut entry = text.to_string();
    if !entry.ends_with('\n') {
        entry.push('\n');
    }
    let resource = Format::Ftl
        .parse(entry.as_bytes(), &FormatContext::default())
        .map_err(|e| Finding::error(Rule::Syntax, format!("Invalid Fluent syntax: {e}")))?;
    let mut units = resource.units();
    let unit = units
        .next()
        .ok_or_else(|| Finding::error(Rule::Syntax, "Translation contains no Fluent message"))?;
    if units.next().is_some() {
        return Err(Finding::error(Rule::Syntax, "Translation contains more than one Fluent message"));
    }
    if unit.key != entity.key {
        return Err(Finding::error(
            Rule::IdMismatch,
            format!("Translation identifier `{}` does not match `{}`", unit.key, entity.key),
        ));
    }
    Ok(unit.value.clone())
}

fn check_placeholders(entity: &Entity, candidate: &Message, texts: &[String], findings: &mut Vec<Finding>) {
    let source: BTreeSet<&str> = entity.source.placeholders().iter().map(|p| p.raw.as_str()).collect();
    for raw in &source {
        if !texts.iter().any(|t| t.contains(raw)) {
            findings.push(Finding::warning(Rule::Placeholder, format!("Missing placeholder: {raw}")));
        }
    }
    let extra: BTreeSet<&str> = candidate
        .placeholders()
        .iter()
        .map(|p| p.raw.as_str())
        .filter(|raw| !source.contains(raw))
        .collect();
    for raw in extra {
        findings.push(Finding::warning(Rule::Placeholder, format!("Unknown placeholder: {raw}")));
    }
}

fn check_whitespace(entity: &Entity, candidate: &Message, findings: &mut Vec<Finding>) {
    if candidate.is_empty() {
        return;
    }
    let source = entity.source.to_plain_text();
    let target = candidate.to_plain_text();
    let leading = |s: &str| s.len() - s.trim_start().len() > 0;
    let trailing = |s: &str| s.len() - s.trim_end().len() > 0;
    if leading(&source) != leading(&target) {
        findings.push(Finding::warning(Rule::Whitespace, "Leading whitespace differs from source"));
    }
    if trailing(&source) != trailing(&target) {
        findings.push(Finding::warning(Rule::Whitespace, "Trailing whitespace differs from source"));
    }
}
