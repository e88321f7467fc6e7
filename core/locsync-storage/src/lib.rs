//! SQLite storage layer for locsync.
//!
//! Persists everything the sync engine reads and writes:
//!
//! - projects, repository state (last pulled revision, pending push)
//! - resources, entities and translations
//! - the append-only action log
//! - per-(entity, locale) "changed since last sync" markers
//! - last-synced repository values (baselines) and export timestamps
//! - sync runs and repository sync logs
//! - named, expiring locks
//!
//! Uniqueness invariants live in the schema: at most one non-obsolete
//! entity per `(resource, key)` and at most one active translation per
//! `(entity, locale)`.

mod error;
mod lock;
mod rows;
mod store;
mod writer;

pub use error::{StorageError, StorageResult};
pub use lock::{LockStore, LockToken, MemoryLockStore, SqliteLockStore};
pub use store::{RepositoryState, Store};
pub use writer::Writer;

/// Default number of rows written per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
