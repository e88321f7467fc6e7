//! Repository/database conflict policy.

use chrono::{DateTime, Utc};
use locsync_model::Translation;
use locsync_types::Message;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One `(entity, locale)` pair changed on both sides since the last sync.
#[derive(Debug, Clone, Copy)]
pub struct Conflict<'a> {
    pub key: &'a str,
    pub locale: &'a str,
    /// True when `locale` is the project's source locale.
    pub source_locale: bool,
    /// Repository value; `None` if the repository removed it.
    pub repository: Option<&'a Message>,
    /// Active database translation, if any.
    pub database: Option<&'a Translation>,
    /// Last change of the repository file.
    pub repository_modified: Option<DateTime<Utc>>,
    /// Last time the database wrote this resource's locale file.
    pub last_export: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Repository,
    Database,
}

/// Why a side won. Recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    SourceLocale,
    NoDatabaseTranslation,
    DatabaseNotApproved,
    NeverExported,
    RepositoryNewer,
    DatabaseApproved,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceLocale => "source locale changes come from the repository",
            Self::NoDatabaseTranslation => "database has no active translation",
            Self::DatabaseNotApproved => "database translation is not approved",
            Self::NeverExported => "database translation was never exported",
            Self::RepositoryNewer => "repository edit is newer than the last export",
            Self::DatabaseApproved => "approved database translation",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub winner: Winner,
    pub reason: Reason,
}

impl Resolution {
    fn repository(reason: Reason) -> Self {
        Self {
            winner: Winner::Repository,
            reason,
        }
    }

    fn database(reason: Reason) -> Self {
        Self {
            winner: Winner::Database,
            reason,
        }
    }

    /// Action log detail for the resolution of `conflict`.
    pub fn describe(&self, conflict: &Conflict<'_>) -> String {
        let side = match self.winner {
            Winner::Repository => "repository",
            Winner::Database => "database",
        };
        format!("{side} wins for {} [{}]: {}", conflict.key, conflict.locale, self.reason)
    }
}

/// Decides which side of a [`Conflict`] prevails.
///
/// Source-locale changes always come from the repository. For target
/// locales an approved database translation wins unless the repository file
/// changed after the database last exported it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, conflict: &Conflict<'_>) -> Resolution {
        if conflict.source_locale {
            return Resolution::repository(Reason::SourceLocale);
        }
        let Some(translation) = conflict.database else {
            return Resolution::repository(Reason::NoDatabaseTranslation);
        };
        if !translation.is_approved() {
            return Resolution::repository(Reason::DatabaseNotApproved);
        }
        match (conflict.repository_modified, conflict.last_export) {
            (_, None) => Resolution::repository(Reason::NeverExported),
            (Some(modified), Some(exported)) if modified > exported => {
                Resolution::repository(Reason::RepositoryNewer)
            }
            _ => Resolution::database(Reason::DatabaseApproved),
        }
    }
}
