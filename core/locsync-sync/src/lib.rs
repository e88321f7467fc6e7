//! Repository/database sync pipeline for locsync.
//!
//! # Architecture
//!
//! A project's strings live in two places: files in a version-controlled
//! repository and translations in the database, where people edit them.
//! A sync run reconciles the two.
//!
//! ## Components
//!
//! - **DiffEngine**: keyed snapshot differences and the per-locale
//!   three-way classification (repository change, database change,
//!   conflict)
//! - **ConflictResolver**: decides which side wins when both changed
//! - **SyncOrchestrator**: the per-project state machine, under a named
//!   expiring lock
//!
//! ## Sync Process
//!
//! 1. **Lock**: take `"{pipeline}:{project}"`, or fail with contention
//! 2. **Pull**: push a commit left by a failed push, then update the
//!    working copy
//! 3. **Diff**: parse source and locale files, compare with entities,
//!    baselines and changed markers
//! 4. **Merge**: turn deltas into imports, removals and exports
//! 5. **Check**: run imports through the quality checker
//! 6. **Commit**: write the database in batches, export locale files,
//!    commit and push
//! 7. **Finalize**: record the run's status and summary, release the lock
//!
//! # Example
//!
//! ```no_run
//! use locsync_storage::Store;
//! use locsync_sync::{ProjectConfig, SyncConfig, SyncOrchestrator};
//! use locsync_tm::TranslationMemory;
//! use std::sync::Arc;
//!
//! # async fn run(project: ProjectConfig) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open_in_memory()?;
//! let locks = Arc::new(store.lock_store());
//! let orchestrator = SyncOrchestrator::new(
//!     store,
//!     locks,
//!     Arc::new(TranslationMemory::new()),
//!     SyncConfig::default(),
//! );
//! let run = orchestrator.sync_project(&project).await?;
//! println!("{}", run.summary.render());
//! # Ok(())
//! # }
//! ```

mod config;
mod conflict;
mod diff;
mod error;
mod orchestrator;
mod plan;
mod state;

pub use config::{LOCALE_PLACEHOLDER, LocaleConfig, ProjectConfig, RepositoryConfig, SyncConfig};
pub use conflict::{Conflict, ConflictResolver, Reason, Resolution, Winner};
pub use diff::{Change, ChangeSet, DiffEngine, SourceString, ThreeWay, TranslationDelta};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{CancelToken, SyncOrchestrator, SyncTicket};
pub use state::{StateBoard, SyncState};
