//! Placeholder syntaxes recognised inside string values.

use locsync_types::{Pattern, PlaceholderKind};
use regex_lite::Regex;
use std::sync::LazyLock;

/// printf directives, including positional (`%1$s`) and named (`%(n)s`) forms.
static PRINTF: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"%(?:[0-9]+\$|\([A-Za-z_][A-Za-z0-9_]*\))?[-+0#']*(?:[0-9]+|\*)?(?:\.(?:[0-9]+|\*))?(?:hh|h|ll|l|L|q|j|z|t)?[diouxXeEfFgGaAcspn@%]",
    )
    .ok()
});

/// MessageFormat arguments: `{0}`, `{1,number}`, `{name}`.
static BRACE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{[A-Za-z0-9_]+(?:,[^{}]*)?\}").ok());

/// XML entity references: `&brandShortName;`.
static ENTITY_REF: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"&[A-Za-z_][A-Za-z0-9_.\-]*;").ok());

/// WebExtension named placeholders: `$USER$`.
static DOLLAR_VAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\$[A-Za-z0-9_@]+\$").ok());

/// Inline markup tags inside XML values: `<b>`, `</b>`, `<xliff:g id="x">`.
static MARKUP: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").ok());

#[derive(Debug, Clone, Copy)]
pub(crate) enum Rule {
    Printf,
    Brace,
    EntityRef,
    DollarVar,
}

impl Rule {
    fn regex(self) -> Option<&'static Regex> {
        match self {
            Self::Printf => PRINTF.as_ref(),
            Self::Brace => BRACE.as_ref(),
            Self::EntityRef => ENTITY_REF.as_ref(),
            Self::DollarVar => DOLLAR_VAR.as_ref(),
        }
    }

    fn kind(self) -> PlaceholderKind {
        match self {
            Self::Printf => PlaceholderKind::Printf,
            Self::Brace => PlaceholderKind::Brace,
            Self::EntityRef => PlaceholderKind::Reference,
            Self::DollarVar => PlaceholderKind::Variable,
        }
    }
}

/// Splits unescaped text into a pattern using `rules`.
pub(crate) fn pattern(text: &str, rules: &[Rule]) -> Pattern {
    let compiled: Vec<(&Regex, PlaceholderKind)> = rules
        .iter()
        .filter_map(|rule| rule.regex().map(|re| (re, rule.kind())))
        .collect();
    Pattern::parse_with(text, &compiled)
}

/// Splits a raw XML value into markup tags and unescaped text runs.
///
/// Tags become verbatim placeholders; text runs go through `unescape` and
/// are then split with `rules`.
pub(crate) fn markup_pattern(
    raw: &str,
    rules: &[Rule],
    unescape: &dyn Fn(&str) -> String,
) -> Pattern {
    let mut out = Pattern::new();
    let mut pos = 0;
    let tags = MARKUP.as_ref().map(|re| re.find_iter(raw).collect::<Vec<_>>());
    for tag in tags.unwrap_or_default() {
        extend(&mut out, pattern(&unescape(&raw[pos..tag.start()]), rules));
        out.push(locsync_types::PatternElement::Placeholder(
            locsync_types::Placeholder::new(PlaceholderKind::Expression, tag.as_str()),
        ));
        pos = tag.end();
    }
    extend(&mut out, pattern(&unescape(&raw[pos..]), rules));
    out
}

fn extend(target: &mut Pattern, other: Pattern) {
    for element in other.elements {
        target.push(element);
    }
}
