//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored value could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A thread panicked while holding the connection.
    #[error("storage lock poisoned")]
    LockPoisoned,
}

impl From<uuid::Error> for StorageError {
    fn from(e: uuid::Error) -> Self {
        Self::InvalidData(format!("invalid id: {e}"))
    }
}

impl From<locsync_model::ModelError> for StorageError {
    fn from(e: locsync_model::ModelError) -> Self {
        Self::InvalidData(e.to_string())
    }
}

impl From<locsync_types::Error> for StorageError {
    fn from(e: locsync_types::Error) -> Self {
        Self::InvalidData(e.to_string())
    }
}

impl From<locsync_formats::FormatError> for StorageError {
    fn from(e: locsync_formats::FormatError) -> Self {
        Self::InvalidData(e.to_string())
    }
}
