//! Persisted records of the sync engine.
//!
//! Defines the rows the storage layer reads and writes:
//! - [`Project`] and [`Resource`]: what is tracked, and where
//! - [`Entity`]: one source string of a resource, never hard-deleted
//! - [`Translation`]: one locale's rendering of an entity with its review state
//! - [`SyncRun`] / [`RepositorySyncLog`]: bookkeeping for each orchestrator run
//!
//! These types are shared by storage, the sync orchestrator and the worker.

mod entity;
mod sync_run;
mod translation;

pub use entity::{Entity, Project, Resource};
pub use sync_run::{
    RejectedCandidate, RepositorySyncLog, SkippedResource, SyncRun, SyncStatus, SyncSummary,
};
pub use translation::{ReviewState, Translation};

/// Errors raised when decoding persisted enum values.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown review state: {0}")]
    UnknownReviewState(String),

    #[error("unknown sync status: {0}")]
    UnknownSyncStatus(String),
}
