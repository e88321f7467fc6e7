//! Write operations, always run inside a [`Store::transaction`].
//!
//! Every translation state change writes its action log row in the same
//! transaction.
//!
//! [`Store::transaction`]: crate::Store::transaction

use crate::error::{StorageError, StorageResult};
use crate::rows::millis;
use crate::store::RepositoryState;
use chrono::{DateTime, Utc};
use locsync_model::{Entity, Resource, ReviewState, Translation};
use locsync_types::{
    ActionLogEntry, ActionType, Actor, EntityId, Message, ProjectId, ResourceId, TranslationId,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

/// Write handle over an open transaction.
pub struct Writer<'a> {
    conn: &'a Connection,
}

impl<'a> Writer<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ── Action log ───────────────────────────────────────────────

    pub fn log(&self, entry: &ActionLogEntry) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO action_log (action, actor, translation_id, entity_id, locale, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.action.as_str(),
                entry.actor.to_string(),
                entry.translation_id.map(|id| id.to_string()),
                entry.entity_id.map(|id| id.to_string()),
                entry.locale,
                entry.detail,
                millis(entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn log_translation(
        &self,
        action: ActionType,
        actor: &Actor,
        id: TranslationId,
        detail: &str,
    ) -> StorageResult<()> {
        let (entity_id, locale) = self.translation_target(id)?;
        self.log(
            &ActionLogEntry::new(action, actor.clone())
                .translation(id)
                .entity(entity_id)
                .locale(locale)
                .detail(detail),
        )
    }

    // ── Repositories ─────────────────────────────────────────────

    pub fn set_repository_state(
        &self,
        project_id: ProjectId,
        url: &str,
        state: &RepositoryState,
    ) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO repositories (project_id, url, last_revision, pending_push)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id, url) DO UPDATE SET last_revision = excluded.last_revision,
                 pending_push = excluded.pending_push",
            params![project_id.to_string(), url, state.last_revision, state.pending_push],
        )?;
        Ok(())
    }

    // ── Resources and entities ───────────────────────────────────

    pub fn insert_resource(&self, resource: &Resource) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO resources (id, project_id, path, format, obsolete) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                resource.id.to_string(),
                resource.project_id.to_string(),
                resource.path,
                resource.format.as_str(),
                resource.obsolete,
            ],
        )?;
        Ok(())
    }

    pub fn set_resource_obsolete(&self, id: ResourceId, obsolete: bool) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE resources SET obsolete = ?2 WHERE id = ?1",
            params![id.to_string(), obsolete],
        )?;
        Ok(())
    }

    pub fn insert_entity(&self, entity: &Entity) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO entities (id, resource_id, key, source, comment, obsolete, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entity.id.to_string(),
                entity.resource_id.to_string(),
                entity.key,
                serde_json::to_string(&entity.source)?,
                entity.comment,
                entity.obsolete,
                millis(entity.created_at),
            ],
        )?;
        Ok(())
    }

    /// Replaces the source value and comment of an entity.
    pub fn update_entity(&self, id: EntityId, source: &Message, comment: Option<&str>) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE entities SET source = ?2, comment = ?3 WHERE id = ?1",
            params![id.to_string(), serde_json::to_string(source)?, comment],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("entity {id}")));
        }
        Ok(())
    }

    /// Flags an entity obsolete. Its translations are kept.
    pub fn obsolete_entity(&self, id: EntityId, actor: &Actor) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE entities SET obsolete = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;
        self.log(&ActionLogEntry::new(ActionType::EntityObsoleted, actor.clone()).entity(id))
    }

    // ── Translations ─────────────────────────────────────────────

    pub(crate) fn translation_target(&self, id: TranslationId) -> StorageResult<(EntityId, String)> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT entity_id, locale FROM translations WHERE id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let (entity_id, locale) = row.ok_or_else(|| StorageError::NotFound(format!("translation {id}")))?;
        Ok((entity_id.parse::<EntityId>()?, locale))
    }

    /// Id of the active translation of `(entity, locale)`, if any.
    pub fn active_translation(&self, entity_id: EntityId, locale: &str) -> StorageResult<Option<TranslationId>> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM translations WHERE entity_id = ?1 AND locale = ?2 AND active = 1",
                params![entity_id.to_string(), locale],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.map(|s| s.parse::<TranslationId>()).transpose()?)
    }

    pub fn review_state(&self, id: TranslationId) -> StorageResult<ReviewState> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM translations WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let state = state.ok_or_else(|| StorageError::NotFound(format!("translation {id}")))?;
        Ok(state.parse::<ReviewState>()?)
    }

    /// Inserts a translation and logs its creation (and approval).
    ///
    /// Fails on the active-uniqueness index if another translation of the
    /// same `(entity, locale)` is still active.
    pub fn insert_translation(&self, translation: &Translation) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO translations (id, entity_id, locale, value, state, active, author,
                 created_at, approved_at, rejected_at, machinery)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                translation.id.to_string(),
                translation.entity_id.to_string(),
                translation.locale,
                serde_json::to_string(&translation.value)?,
                translation.state.as_str(),
                translation.active,
                translation.author.to_string(),
                millis(translation.created_at),
                translation.approved_at.map(millis),
                translation.rejected_at.map(millis),
                serde_json::to_string(&translation.machinery_sources)?,
            ],
        )?;
        let entry = |action| {
            ActionLogEntry::new(action, translation.author.clone())
                .translation(translation.id)
                .entity(translation.entity_id)
                .locale(translation.locale.clone())
        };
        self.log(&entry(ActionType::TranslationCreated))?;
        if translation.state == ReviewState::Approved {
            self.log(&entry(ActionType::TranslationApproved))?;
        }
        Ok(())
    }

    /// Deactivates a translation that a newer one replaces.
    ///
    /// An approved translation loses its approval; an unreviewed one is
    /// rejected.
    pub fn supersede_translation(&self, id: TranslationId, actor: &Actor, detail: &str) -> StorageResult<()> {
        if self.review_state(id)? == ReviewState::Approved {
            self.conn.execute(
                "UPDATE translations SET active = 0, state = ?2, approved_at = NULL WHERE id = ?1",
                params![id.to_string(), ReviewState::Unreviewed.as_str()],
            )?;
            self.log_translation(ActionType::TranslationUnapproved, actor, id, detail)
        } else {
            self.reject_translation(id, actor, detail)
        }
    }

    pub fn approve_translation(&self, id: TranslationId, actor: &Actor) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE translations SET active = 1, state = ?2, approved_at = ?3, rejected_at = NULL
             WHERE id = ?1",
            params![id.to_string(), ReviewState::Approved.as_str(), millis(Utc::now())],
        )?;
        self.log_translation(ActionType::TranslationApproved, actor, id, "")
    }

    /// Rejects a translation and takes it out of the active slot.
    pub fn reject_translation(&self, id: TranslationId, actor: &Actor, detail: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE translations SET active = 0, state = ?2, rejected_at = ?3 WHERE id = ?1",
            params![id.to_string(), ReviewState::Rejected.as_str(), millis(Utc::now())],
        )?;
        self.log_translation(ActionType::TranslationRejected, actor, id, detail)
    }

    /// Deactivates a translation whose string was removed upstream.
    pub fn remove_translation(&self, id: TranslationId, actor: &Actor, detail: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE translations SET active = 0 WHERE id = ?1",
            params![id.to_string()],
        )?;
        self.log_translation(ActionType::TranslationDeleted, actor, id, detail)
    }

    /// Deletes the translation row after logging the purge.
    pub fn purge_translation(&self, id: TranslationId, actor: &Actor) -> StorageResult<()> {
        self.log_translation(ActionType::TranslationPurged, actor, id, "")?;
        self.conn
            .execute("DELETE FROM translations WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    // ── Changed markers ──────────────────────────────────────────

    pub fn mark_changed(&self, entity_id: EntityId, locale: &str) -> StorageResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO changed_entity_locale (entity_id, locale, created_at) VALUES (?1, ?2, ?3)",
            params![entity_id.to_string(), locale, millis(Utc::now())],
        )?;
        Ok(())
    }

    pub fn clear_changed(&self, entity_id: EntityId, locale: &str) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM changed_entity_locale WHERE entity_id = ?1 AND locale = ?2",
            params![entity_id.to_string(), locale],
        )?;
        Ok(())
    }

    // ── Baselines and exports ────────────────────────────────────

    /// Replaces the recorded repository values of a resource's locale file.
    pub fn replace_baseline(
        &self,
        resource_id: ResourceId,
        locale: &str,
        values: &BTreeMap<String, Message>,
    ) -> StorageResult<()> {
        let resource = resource_id.to_string();
        self.conn.execute(
            "DELETE FROM baselines WHERE resource_id = ?1 AND locale = ?2",
            params![resource, locale],
        )?;
        let mut insert = self
            .conn
            .prepare_cached("INSERT INTO baselines (resource_id, locale, key, value) VALUES (?1, ?2, ?3, ?4)")?;
        for (key, value) in values {
            insert.execute(params![resource, locale, key, serde_json::to_string(value)?])?;
        }
        self.conn.execute(
            "INSERT INTO baseline_sets (resource_id, locale, synced_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource_id, locale) DO UPDATE SET synced_at = excluded.synced_at",
            params![resource, locale, millis(Utc::now())],
        )?;
        Ok(())
    }

    pub fn record_export(&self, resource_id: ResourceId, locale: &str, at: DateTime<Utc>) -> StorageResult<()> {
        self.conn.execute(
            "INSERT INTO exports (resource_id, locale, exported_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(resource_id, locale) DO UPDATE SET exported_at = excluded.exported_at",
            params![resource_id.to_string(), locale, millis(at)],
        )?;
        Ok(())
    }
}
