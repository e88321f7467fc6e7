//! Error types for the format layer.

use crate::Format;
use thiserror::Error;

/// Result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;

/// Errors that can occur while parsing or merging a resource.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Syntax error at a given 1-based line.
    #[error("{format} parse error at line {line}: {message}")]
    Parse {
        format: Format,
        line: usize,
        message: String,
    },

    /// The file is not valid UTF-8.
    #[error("{format}: invalid UTF-8: {source}")]
    Encoding {
        format: Format,
        #[source]
        source: std::str::Utf8Error,
    },

    /// JSON document error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The path does not map to a supported format.
    #[error("unsupported resource: {0}")]
    Unsupported(String),
}

impl FormatError {
    pub(crate) fn parse(format: Format, line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            format,
            line,
            message: message.into(),
        }
    }

    /// Parse error located at byte offset `pos` of `text`.
    pub(crate) fn at(format: Format, text: &str, pos: usize, message: impl Into<String>) -> Self {
        let pos = pos.min(text.len());
        let line = text.as_bytes()[..pos].iter().filter(|b| **b == b'\n').count() + 1;
        Self::parse(format, line, message)
    }
}
