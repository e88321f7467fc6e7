//! Core type definitions for locsync.
//!
//! This crate defines the fundamental, format-agnostic types used throughout
//! the sync engine:
//! - Project, resource, entity, translation and sync-run identifiers (UUID v7)
//! - Locales and their CLDR plural categories
//! - The canonical [`Message`] model every file format maps into
//! - Append-only action log entries
//!
//! Persisted records (resources, entities, translations, sync runs) live in
//! `locsync-model`; this crate only carries the vocabulary they are built from.

mod action;
mod ids;
mod locale;
mod message;

pub use action::{ActionLogEntry, ActionType, Actor};
pub use ids::{EntityId, ProjectId, ResourceId, SyncId, TranslationId};
pub use locale::{Locale, PluralCategory};
pub use message::{
    Attribute, Message, Pattern, PatternElement, Placeholder, PlaceholderKind, Select, Selector,
    Variant, VariantKey, CATCH_ALL_LABEL,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid plural category: {0}")]
    InvalidPluralCategory(String),

    #[error("invalid action type: {0}")]
    InvalidActionType(String),

    #[error("invalid actor: {0}")]
    InvalidActor(String),
}
