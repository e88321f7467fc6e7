//! Error types for repository operations.

use thiserror::Error;

/// Result type for repository operations.
pub type VcsResult<T> = Result<T, VcsError>;

/// Errors that can occur while talking to a repository.
#[derive(Debug, Error)]
pub enum VcsError {
    /// Neither updating the working copy nor a fresh checkout succeeded.
    #[error("repository unavailable: {url}: {detail}")]
    RepositoryUnavailable { url: String, detail: String },

    /// A VCS command exited unsuccessfully.
    #[error("`{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A VCS command printed something we could not interpret.
    #[error("unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    /// The command could not be started.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
