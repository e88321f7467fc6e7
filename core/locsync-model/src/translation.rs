use crate::ModelError;
use chrono::{DateTime, Utc};
use locsync_types::{Actor, EntityId, Message, TranslationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Review lifecycle of a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    Unreviewed,
    Approved,
    Rejected,
}

impl ReviewState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unreviewed => "unreviewed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unreviewed" => Ok(Self::Unreviewed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(ModelError::UnknownReviewState(other.to_string())),
        }
    }
}

/// One locale's rendering of an entity.
///
/// At most one translation per `(entity_id, locale)` is `active`; the storage
/// layer enforces this with a unique index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub id: TranslationId,
    pub entity_id: EntityId,
    pub locale: String,
    pub value: Message,
    pub state: ReviewState,
    pub active: bool,
    pub author: Actor,
    pub created_at: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    /// External suggestion sources used; empty for fully human translations.
    #[serde(default)]
    pub machinery_sources: BTreeSet<String>,
}

impl Translation {
    /// Creates an active, unreviewed translation.
    pub fn new(
        entity_id: EntityId,
        locale: impl Into<String>,
        value: Message,
        author: Actor,
    ) -> Self {
        Self {
            id: TranslationId::new(),
            entity_id,
            locale: locale.into(),
            value,
            state: ReviewState::Unreviewed,
            active: true,
            author,
            created_at: Utc::now(),
            approved_at: None,
            rejected_at: None,
            machinery_sources: BTreeSet::new(),
        }
    }

    /// Marks the translation approved as of its creation time.
    #[must_use]
    pub fn approved(mut self) -> Self {
        self.state = ReviewState::Approved;
        self.approved_at = Some(self.created_at);
        self
    }

    #[must_use]
    pub fn with_machinery_source(mut self, source: impl Into<String>) -> Self {
        self.machinery_sources.insert(source.into());
        self
    }

    pub fn is_approved(&self) -> bool {
        self.state == ReviewState::Approved
    }

    /// When the translation last changed state.
    pub fn last_transition(&self) -> DateTime<Utc> {
        [Some(self.created_at), self.approved_at, self.rejected_at]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(self.created_at)
    }
}
