//! Pipeline states and per-project state tracking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Stage of a project's sync pipeline.
///
/// A run walks `Locked → Pulling → Diffing → Merging → Checking →
/// Committing → Finalizing` and returns to `Idle`. `Aborted` is entered from
/// any active stage on an unrecoverable error and is left by the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Locked,
    Pulling,
    Diffing,
    Merging,
    Checking,
    Committing,
    Finalizing,
    Aborted,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Locked => "locked",
            Self::Pulling => "pulling",
            Self::Diffing => "diffing",
            Self::Merging => "merging",
            Self::Checking => "checking",
            Self::Committing => "committing",
            Self::Finalizing => "finalizing",
            Self::Aborted => "aborted",
        }
    }

    /// True while a run owns the project.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle | Self::Aborted)
    }

    /// The stage a successful run enters after this one.
    pub fn next(&self) -> Option<Self> {
        Some(match self {
            Self::Idle => Self::Locked,
            Self::Locked => Self::Pulling,
            Self::Pulling => Self::Diffing,
            Self::Diffing => Self::Merging,
            Self::Merging => Self::Checking,
            Self::Checking => Self::Committing,
            Self::Committing => Self::Finalizing,
            Self::Finalizing => Self::Idle,
            Self::Aborted => return None,
        })
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state of every project this process has synced.
#[derive(Debug, Clone, Default)]
pub struct StateBoard {
    states: Arc<Mutex<HashMap<String, SyncState>>>,
}

impl StateBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `project`; `Idle` if it never ran here.
    pub fn get(&self, project: &str) -> SyncState {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(project).copied().unwrap_or(SyncState::Idle)
    }

    pub(crate) fn set(&self, project: &str, state: SyncState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.insert(project.to_string(), state);
    }

    /// Projects with a run in progress.
    pub fn active(&self) -> Vec<String> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let mut active: Vec<String> = states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(p, _)| p.clone())
            .collect();
        active.sort();
        active
    }
}
