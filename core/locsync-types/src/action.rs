//! Action log entries.
//!
//! Every state change of a translation is mirrored into an append-only
//! action log. The log serves both as an audit trail and as the record of
//! provenance for automatic decisions made by a sync run.

use crate::{EntityId, Error, SyncId, TranslationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of change an action log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// A translation was created (human edit or repository import).
    TranslationCreated,
    /// A translation was approved.
    TranslationApproved,
    /// A translation was rejected, either by a reviewer or by a sync conflict.
    TranslationRejected,
    /// An approval was withdrawn.
    TranslationUnapproved,
    /// A translation stopped being active because it was removed upstream.
    TranslationDeleted,
    /// A translation row was physically removed.
    TranslationPurged,
    /// A repository/database conflict was decided.
    ConflictResolved,
    /// An entity was marked obsolete.
    EntityObsoleted,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TranslationCreated => "translation:created",
            Self::TranslationApproved => "translation:approved",
            Self::TranslationRejected => "translation:rejected",
            Self::TranslationUnapproved => "translation:unapproved",
            Self::TranslationDeleted => "translation:deleted",
            Self::TranslationPurged => "translation:purged",
            Self::ConflictResolved => "conflict:resolved",
            Self::EntityObsoleted => "entity:obsoleted",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "translation:created" => Self::TranslationCreated,
            "translation:approved" => Self::TranslationApproved,
            "translation:rejected" => Self::TranslationRejected,
            "translation:unapproved" => Self::TranslationUnapproved,
            "translation:deleted" => Self::TranslationDeleted,
            "translation:purged" => Self::TranslationPurged,
            "conflict:resolved" => Self::ConflictResolved,
            "entity:obsoleted" => Self::EntityObsoleted,
            other => return Err(Error::InvalidActionType(other.to_string())),
        })
    }
}

/// Who performed an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// A named user (edits made through the web front end).
    User(String),
    /// An automatic decision taken by the given sync run.
    Sync(SyncId),
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "user:{name}"),
            Self::Sync(id) => write!(f, "sync:{id}"),
        }
    }
}

impl FromStr for Actor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some(("user", name)) if !name.is_empty() => Ok(Self::User(name.to_string())),
            Some(("sync", id)) => Ok(Self::Sync(id.parse()?)),
            _ => Err(Error::InvalidActor(s.to_string())),
        }
    }
}

/// A single append-only action log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub action: ActionType,
    pub actor: Actor,
    #[serde(default)]
    pub translation_id: Option<TranslationId>,
    #[serde(default)]
    pub entity_id: Option<EntityId>,
    #[serde(default)]
    pub locale: Option<String>,
    /// Free-form context (conflict reason, previous value).
    #[serde(default)]
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl ActionLogEntry {
    /// Creates an entry timestamped now.
    #[must_use]
    pub fn new(action: ActionType, actor: Actor) -> Self {
        Self {
            action,
            actor,
            translation_id: None,
            entity_id: None,
            locale: None,
            detail: String::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn translation(mut self, id: TranslationId) -> Self {
        self.translation_id = Some(id);
        self
    }

    #[must_use]
    pub fn entity(mut self, id: EntityId) -> Self {
        self.entity_id = Some(id);
        self
    }

    #[must_use]
    pub fn locale(mut self, code: impl Into<String>) -> Self {
        self.locale = Some(code.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// The sync run this entry was written by, if any.
    pub fn sync_id(&self) -> Option<SyncId> {
        match self.actor {
            Actor::Sync(id) => Some(id),
            Actor::User(_) => None,
        }
    }
}
