//! Snapshot differences.
//!
//! A run diffs twice: the source file against the database's entities, and
//! for every locale the repository file against the baseline recorded by the
//! previous run, combined with the database's changed markers.

use locsync_types::Message;
use std::collections::{BTreeMap, BTreeSet};

/// Keys added, removed and modified between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet<V> {
    pub added: BTreeMap<String, V>,
    pub removed: BTreeMap<String, V>,
    /// `(before, after)` per key.
    pub modified: BTreeMap<String, (V, V)>,
}

impl<V> Default for ChangeSet<V> {
    fn default() -> Self {
        Self {
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            modified: BTreeMap::new(),
        }
    }
}

impl<V> ChangeSet<V> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }

    /// True if `key` is added, removed or modified.
    pub fn touches(&self, key: &str) -> bool {
        self.added.contains_key(key) || self.removed.contains_key(key) || self.modified.contains_key(key)
    }
}

/// Source side of an entity as read from the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceString {
    pub source: Message,
    pub comment: Option<String>,
}

/// Inputs of a per-locale three-way diff, all keyed by entity key.
#[derive(Debug, Clone, Copy)]
pub struct ThreeWay<'a> {
    /// Repository values recorded by the previous run.
    pub baseline: &'a BTreeMap<String, Message>,
    /// Values in the freshly pulled repository file.
    pub repository: &'a BTreeMap<String, Message>,
    /// Active database translations.
    pub database: &'a BTreeMap<String, Message>,
    /// Keys carrying a changed-since-last-sync marker.
    pub marked: &'a BTreeSet<String>,
}

/// Which side of a translation moved since the baseline.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Only the repository changed; `None` means the value was removed.
    Repository { value: Option<Message> },
    /// Only the database changed.
    Database,
    /// Both changed to different values.
    Conflict {
        repository: Option<Message>,
        database: Option<Message>,
    },
    /// Both changed to the same value.
    Converged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationDelta {
    pub key: String,
    pub change: Change,
}

/// Computes [`ChangeSet`]s and translation deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiffEngine;

impl DiffEngine {
    /// Differences from `baseline` to `current`.
    pub fn diff<V: Clone + PartialEq>(
        baseline: &BTreeMap<String, V>,
        current: &BTreeMap<String, V>,
    ) -> ChangeSet<V> {
        let mut changes = ChangeSet::default();
        for (key, before) in baseline {
            match current.get(key) {
                None => {
                    changes.removed.insert(key.clone(), before.clone());
                }
                Some(after) if after != before => {
                    changes.modified.insert(key.clone(), (before.clone(), after.clone()));
                }
                Some(_) => {}
            }
        }
        for (key, after) in current {
            if !baseline.contains_key(key) {
                changes.added.insert(key.clone(), after.clone());
            }
        }
        changes
    }

    /// Classifies every key that changed on either side since the baseline.
    ///
    /// A database change needs a marker and a value that differs from the
    /// baseline; a marker whose edit was reverted counts as unchanged.
    pub fn three_way(input: ThreeWay<'_>) -> Vec<TranslationDelta> {
        let repository_changes = Self::diff(input.baseline, input.repository);
        let keys: BTreeSet<&String> = repository_changes
            .added
            .keys()
            .chain(repository_changes.removed.keys())
            .chain(repository_changes.modified.keys())
            .chain(input.marked.iter())
            .collect();

        let mut deltas = Vec::new();
        for key in keys {
            let repository = input.repository.get(key);
            let database = input.database.get(key);
            let repository_changed = repository_changes.touches(key);
            let database_changed = input.marked.contains(key) && database != input.baseline.get(key);
            let change = match (repository_changed, database_changed) {
                (false, false) => continue,
                (true, false) => Change::Repository {
                    value: repository.cloned(),
                },
                (false, true) => Change::Database,
                (true, true) if repository == database => Change::Converged,
                (true, true) => Change::Conflict {
                    repository: repository.cloned(),
                    database: database.cloned(),
                },
            };
            deltas.push(TranslationDelta {
                key: key.clone(),
                change,
            });
        }
        deltas
    }
}
