//! Helpers shared by the XML-based adapters.

use crate::{Format, FormatError, FormatResult, ParsedResource};
use quick_xml::events::BytesStart;

/// Reads an attribute value, unescaped.
pub(crate) fn attribute(
    format: Format,
    text: &str,
    pos: usize,
    element: &BytesStart<'_>,
    name: &str,
) -> FormatResult<Option<String>> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|e| FormatError::at(format, text, pos, e.to_string()))?;
    attr.map(|a| {
        a.unescape_value()
            .map(|v| v.into_owned())
            .map_err(|e| FormatError::at(format, text, pos, e.to_string()))
    })
    .transpose()
}

/// Resolves XML entities, leaving malformed text unchanged.
pub(crate) fn unescape(text: &str) -> String {
    quick_xml::escape::unescape(text)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

pub(crate) fn escape_text(text: &str) -> String {
    quick_xml::escape::partial_escape(text).into_owned()
}

pub(crate) fn escape_attr(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// Whitespace between the start of the line and `pos`, if the line holds
/// nothing else before it.
pub(crate) fn line_indent(text: &str, pos: usize) -> &str {
    let line_start = text[..pos].rfind('\n').map_or(0, |p| p + 1);
    let prefix = &text[line_start..pos];
    if prefix.trim().is_empty() { prefix } else { "" }
}

/// Pushes the text from `cursor` to the end, marking the insertion point for
/// new units at the start of the line holding the container's closing tag.
pub(crate) fn push_tail(resource: &mut ParsedResource, text: &str, cursor: usize, closing: Option<usize>) {
    let Some(closing) = closing.filter(|c| *c >= cursor) else {
        resource.push_raw(&text[cursor.min(text.len())..]);
        return;
    };
    let indent = line_indent(text, closing);
    let split = if text[cursor..closing].contains('\n') {
        closing - indent.len()
    } else {
        closing
    };
    resource.push_raw(&text[cursor..split]);
    resource.mark_insert_point();
    resource.push_raw(&text[split..]);
}
