//! Column encoding shared by the store, the writer and the lock store.

use chrono::{DateTime, Utc};
use locsync_model::{Entity, Translation};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use std::str::FromStr;

pub(crate) const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        slug TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        source_locale TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS repositories (
        project_id TEXT NOT NULL,
        url TEXT NOT NULL,
        last_revision TEXT,
        pending_push INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (project_id, url)
    );

    CREATE TABLE IF NOT EXISTS resources (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        path TEXT NOT NULL,
        format TEXT NOT NULL,
        obsolete INTEGER NOT NULL DEFAULT 0,
        UNIQUE(project_id, path)
    );

    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY,
        resource_id TEXT NOT NULL,
        key TEXT NOT NULL,
        source TEXT NOT NULL,
        comment TEXT,
        obsolete INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS entities_live_key
        ON entities(resource_id, key) WHERE obsolete = 0;

    CREATE TABLE IF NOT EXISTS translations (
        id TEXT PRIMARY KEY,
        entity_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        value TEXT NOT NULL,
        state TEXT NOT NULL,
        active INTEGER NOT NULL,
        author TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        approved_at INTEGER,
        rejected_at INTEGER,
        machinery TEXT NOT NULL DEFAULT '[]'
    );
    CREATE UNIQUE INDEX IF NOT EXISTS translations_one_active
        ON translations(entity_id, locale) WHERE active = 1;
    CREATE INDEX IF NOT EXISTS translations_entity_locale
        ON translations(entity_id, locale);

    CREATE TABLE IF NOT EXISTS action_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        action TEXT NOT NULL,
        actor TEXT NOT NULL,
        translation_id TEXT,
        entity_id TEXT,
        locale TEXT,
        detail TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS changed_entity_locale (
        entity_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        PRIMARY KEY (entity_id, locale)
    );

    CREATE TABLE IF NOT EXISTS baseline_sets (
        resource_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        synced_at INTEGER NOT NULL,
        PRIMARY KEY (resource_id, locale)
    );

    CREATE TABLE IF NOT EXISTS baselines (
        resource_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        PRIMARY KEY (resource_id, locale, key)
    );

    CREATE TABLE IF NOT EXISTS exports (
        resource_id TEXT NOT NULL,
        locale TEXT NOT NULL,
        exported_at INTEGER NOT NULL,
        PRIMARY KEY (resource_id, locale)
    );

    CREATE TABLE IF NOT EXISTS sync_runs (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        finished_at INTEGER,
        status TEXT NOT NULL,
        error TEXT,
        summary TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS repository_sync_logs (
        sync_id TEXT NOT NULL,
        url TEXT NOT NULL,
        revision TEXT,
        started_at INTEGER NOT NULL,
        finished_at INTEGER,
        PRIMARY KEY (sync_id, url)
    );
";

pub(crate) const LOCK_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS locks (
        name TEXT PRIMARY KEY,
        owner TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );
";

pub(crate) const ENTITY_COLUMNS: &str =
    "e.id, e.resource_id, e.key, e.source, e.comment, e.obsolete, e.created_at";

pub(crate) const TRANSLATION_COLUMNS: &str = "t.id, t.entity_id, t.locale, t.value, t.state, \
     t.active, t.author, t.created_at, t.approved_at, t.rejected_at, t.machinery";

pub(crate) fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn conversion<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

/// Reads a text column through `FromStr`.
pub(crate) fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e| conversion(idx, e))
}

pub(crate) fn opt_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(text) => text.parse().map(Some).map_err(|e| conversion(idx, e)),
        None => Ok(None),
    }
}

/// Reads a JSON text column.
pub(crate) fn json<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text).map_err(|e| conversion(idx, e))
}

/// Reads a millisecond timestamp column.
pub(crate) fn time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

pub(crate) fn opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(ms) => DateTime::from_timestamp_millis(ms)
            .map(Some)
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms)),
        None => Ok(None),
    }
}

/// Maps a row selected with [`ENTITY_COLUMNS`].
pub(crate) fn entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: parsed(row, 0)?,
        resource_id: parsed(row, 1)?,
        key: row.get(2)?,
        source: json(row, 3)?,
        comment: row.get(4)?,
        obsolete: row.get(5)?,
        created_at: time(row, 6)?,
    })
}

/// Maps a row selected with [`TRANSLATION_COLUMNS`], starting at `offset`.
pub(crate) fn translation_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<Translation> {
    Ok(Translation {
        id: parsed(row, offset)?,
        entity_id: parsed(row, offset + 1)?,
        locale: row.get(offset + 2)?,
        value: json(row, offset + 3)?,
        state: parsed(row, offset + 4)?,
        active: row.get(offset + 5)?,
        author: parsed(row, offset + 6)?,
        created_at: time(row, offset + 7)?,
        approved_at: opt_time(row, offset + 8)?,
        rejected_at: opt_time(row, offset + 9)?,
        machinery_sources: json(row, offset + 10)?,
    })
}

pub(crate) fn translation(row: &Row<'_>) -> rusqlite::Result<Translation> {
    translation_at(row, 0)
}
