//! Error types for the sync pipeline.

use crate::state::SyncState;
use locsync_formats::FormatError;
use locsync_model::SkippedResource;
use locsync_storage::StorageError;
use locsync_vcs::VcsError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a sync run, or keep one from starting.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote could not be reached, or a pending push failed again.
    /// Raised before any database write.
    #[error("repository unavailable: {url}: {detail}")]
    RepositoryUnavailable { url: String, detail: String },

    /// A file failed to parse or export. The run skips it and goes on;
    /// see [`SyncError::skipped_resource`].
    #[error("cannot parse {path}: {source}")]
    FormatParse {
        path: String,
        /// `None` for a source file.
        locale: Option<String>,
        #[source]
        source: FormatError,
    },

    /// Another run holds the project's lock.
    #[error("sync already running for project {project}")]
    LockContention { project: String },

    /// The lock expired and someone else took it mid-run.
    #[error("lock for project {project} was lost")]
    LockLost { project: String },

    /// The local commit exists but the push was rejected. The commit is
    /// kept and pushed at the start of the next run.
    #[error("commit {revision} was not pushed: {detail}")]
    PartialCommitFailure { revision: String, detail: String },

    /// Cancellation was requested; the run stopped before `stage`.
    #[error("cancelled before {stage}")]
    Cancelled { stage: SyncState },

    /// The run exceeded its configured time cap.
    #[error("run exceeded {limit:?}, aborted before {stage}")]
    TimeLimit { limit: Duration, stage: SyncState },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A version control operation failed after the pull (commit).
    #[error("vcs error: {0}")]
    Vcs(#[from] VcsError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The spawned pipeline task panicked or was aborted.
    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// The summary entry for an error that skips one file instead of
    /// ending the run.
    pub fn skipped_resource(&self) -> Option<SkippedResource> {
        match self {
            Self::FormatParse { path, locale, source } => Some(SkippedResource {
                path: path.clone(),
                locale: locale.clone(),
                error: source.to_string(),
            }),
            _ => None,
        }
    }
}
