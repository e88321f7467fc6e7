//! Line splitting and small text helpers shared by the line-based adapters.

use locsync_types::{Pattern, PatternElement};

/// A physical line with byte offsets into the document.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Line<'a> {
    /// Offset of the first byte.
    pub start: usize,
    /// Line content without the terminator (`\n` or `\r\n`).
    pub content: &'a str,
    /// Offset one past the terminator.
    pub end: usize,
}

impl Line<'_> {
    /// Offset one past the content.
    pub fn content_end(&self) -> usize {
        self.start + self.content.len()
    }

    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

pub(crate) fn lines(text: &str) -> Vec<Line<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    for chunk in text.split_inclusive('\n') {
        let end = start + chunk.len();
        let content = chunk
            .strip_suffix('\n')
            .map(|c| c.strip_suffix('\r').unwrap_or(c))
            .unwrap_or(chunk);
        out.push(Line {
            start,
            content,
            end,
        });
        start = end;
    }
    out
}

/// Renders a pattern without select support, escaping text runs and keeping
/// placeholders verbatim. Selects contribute their catch-all branch.
pub(crate) fn render_flat(pattern: &Pattern, escape: &dyn Fn(&str) -> String) -> String {
    let mut out = String::new();
    for element in &pattern.elements {
        match element {
            PatternElement::Text(text) => out.push_str(&escape(text)),
            PatternElement::Placeholder(p) => out.push_str(&p.raw),
            PatternElement::Select(select) => {
                if let Some(variant) = select.catch_all() {
                    out.push_str(&render_flat(&variant.value, escape));
                }
            }
        }
    }
    out
}

/// Strips a leading comment marker and one following space.
pub(crate) fn comment_body<'a>(line: &'a str, marker: &str) -> &'a str {
    let body = line.trim_start().strip_prefix(marker).unwrap_or(line);
    body.strip_prefix(' ').unwrap_or(body)
}

/// Joins collected comment lines, `None` when there are none.
pub(crate) fn join_comment(lines: &[String]) -> Option<String> {
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Decodes the four hex digits of a `\uXXXX` escape.
pub(crate) fn hex_char(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}
