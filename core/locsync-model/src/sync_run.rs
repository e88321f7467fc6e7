//! Run bookkeeping.
//!
//! One [`SyncRun`] is written per orchestrator invocation per project. It is
//! created when the pipeline starts and finalized exactly once.

use crate::ModelError;
use chrono::{DateTime, Utc};
use locsync_types::{ProjectId, SyncId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

/// Status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    /// The run has started and has not been finalized.
    InProgress,
    /// Changes were found and applied.
    Done,
    /// No entity or translation deltas were found.
    NoChanges,
    /// The run aborted; `SyncRun::error` carries the reason.
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in-progress",
            Self::Done => "done",
            Self::NoChanges => "no-changes",
            Self::Failed => "failed",
        }
    }

    /// True once the run has been finalized.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "no-changes" => Ok(Self::NoChanges),
            "failed" => Ok(Self::Failed),
            other => Err(ModelError::UnknownSyncStatus(other.to_string())),
        }
    }
}

/// A resource that failed to parse and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedResource {
    pub path: String,
    pub locale: Option<String>,
    pub error: String,
}

/// A repository-side translation the quality gate refused to import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    pub path: String,
    pub key: String,
    pub locale: String,
    pub findings: Vec<String>,
}

/// Counters and per-item reports collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub resources_added: usize,
    pub resources_obsoleted: usize,
    pub entities_added: usize,
    pub entities_updated: usize,
    pub entities_obsoleted: usize,
    pub translations_imported: usize,
    pub translations_removed: usize,
    pub translations_rejected: usize,
    pub conflicts_resolved: usize,
    pub files_committed: usize,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub push_pending: bool,
    #[serde(default)]
    pub skipped_resources: Vec<SkippedResource>,
    #[serde(default)]
    pub rejected_candidates: Vec<RejectedCandidate>,
}

impl SyncSummary {
    /// True if the run changed the database or the repository.
    pub fn has_changes(&self) -> bool {
        self.resources_added
            + self.resources_obsoleted
            + self.entities_added
            + self.entities_updated
            + self.entities_obsoleted
            + self.translations_imported
            + self.translations_removed
            + self.translations_rejected
            + self.conflicts_resolved
            + self.files_committed
            > 0
    }

    /// Human-readable multi-line report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "entities: +{} ~{} -{}; translations: +{} -{} rejected {}; conflicts: {}; files committed: {}",
            self.entities_added,
            self.entities_updated,
            self.entities_obsoleted,
            self.translations_imported,
            self.translations_removed,
            self.translations_rejected,
            self.conflicts_resolved,
            self.files_committed,
        );
        if self.push_pending {
            let _ = writeln!(out, "push pending: local commit kept for the next run");
        }
        for skipped in &self.skipped_resources {
            match &skipped.locale {
                Some(locale) => {
                    let _ = writeln!(out, "skipped {} [{}]: {}", skipped.path, locale, skipped.error);
                }
                None => {
                    let _ = writeln!(out, "skipped {}: {}", skipped.path, skipped.error);
                }
            }
        }
        for rejected in &self.rejected_candidates {
            let _ = writeln!(
                out,
                "rejected {} [{}] {}: {}",
                rejected.path,
                rejected.locale,
                rejected.key,
                rejected.findings.join("; ")
            );
        }
        out
    }
}

/// One orchestrator run for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: SyncId,
    pub project_id: ProjectId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub summary: SyncSummary,
}

impl SyncRun {
    /// A run that has just started.
    pub fn start(project_id: ProjectId) -> Self {
        Self {
            id: SyncId::new(),
            project_id,
            started_at: Utc::now(),
            finished_at: None,
            status: SyncStatus::InProgress,
            error: None,
            summary: SyncSummary::default(),
        }
    }
}

/// Repository-level record of a run: which revision was pulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositorySyncLog {
    pub sync_id: SyncId,
    pub url: String,
    pub revision: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
