//! Read side of the database and the transaction entry point.

use crate::error::{StorageError, StorageResult};
use crate::lock::SqliteLockStore;
use crate::rows::{self, ENTITY_COLUMNS, TRANSLATION_COLUMNS, millis};
use crate::writer::Writer;
use chrono::{DateTime, Utc};
use locsync_model::{Entity, Project, RepositorySyncLog, Resource, ReviewState, SyncRun, SyncStatus, Translation};
use locsync_types::{
    ActionLogEntry, ActionType, Actor, EntityId, Message, ProjectId, ResourceId, SyncId,
    TranslationId,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// What the database remembers about a project's repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryState {
    /// Revision the last successful run synced to.
    pub last_revision: Option<String>,
    /// A local commit exists whose push failed.
    pub pending_push: bool,
}

/// Persistent store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(rows::SCHEMA)?;
        conn.execute_batch(rows::LOCK_SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// A lock store sharing this database.
    pub fn lock_store(&self) -> SqliteLockStore {
        SqliteLockStore::shared(self.conn.clone())
    }

    /// Runs `f` inside one transaction; any error rolls everything back.
    pub fn transaction<T>(&self, f: impl FnOnce(&Writer<'_>) -> StorageResult<T>) -> StorageResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let out = f(&Writer::new(&tx))?;
        tx.commit()?;
        Ok(out)
    }

    // ── Projects ─────────────────────────────────────────────────

    /// Inserts or updates a project.
    pub fn save_project(&self, project: &Project) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO projects (id, slug, name, source_locale) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET slug = excluded.slug, name = excluded.name,
                 source_locale = excluded.source_locale",
            params![project.id.to_string(), project.slug, project.name, project.source_locale],
        )?;
        Ok(())
    }

    pub fn project_by_slug(&self, slug: &str) -> StorageResult<Option<Project>> {
        let conn = self.conn()?;
        let project = conn
            .query_row(
                "SELECT id, slug, name, source_locale FROM projects WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(Project {
                        id: rows::parsed(row, 0)?,
                        slug: row.get(1)?,
                        name: row.get(2)?,
                        source_locale: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(project)
    }

    // ── Repositories ─────────────────────────────────────────────

    pub fn repository_state(&self, project_id: ProjectId, url: &str) -> StorageResult<RepositoryState> {
        let conn = self.conn()?;
        let state = conn
            .query_row(
                "SELECT last_revision, pending_push FROM repositories
                 WHERE project_id = ?1 AND url = ?2",
                params![project_id.to_string(), url],
                |row| {
                    Ok(RepositoryState {
                        last_revision: row.get(0)?,
                        pending_push: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(state.unwrap_or_default())
    }

    pub fn set_repository_state(
        &self,
        project_id: ProjectId,
        url: &str,
        state: &RepositoryState,
    ) -> StorageResult<()> {
        let conn = self.conn()?;
        Writer::new(&conn).set_repository_state(project_id, url, state)
    }

    // ── Resources and entities ───────────────────────────────────

    /// Every resource of a project, obsolete ones included.
    pub fn resources(&self, project_id: ProjectId) -> StorageResult<Vec<Resource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, path, format, obsolete FROM resources
             WHERE project_id = ?1 ORDER BY path",
        )?;
        let resources = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok(Resource {
                    id: rows::parsed(row, 0)?,
                    project_id: rows::parsed(row, 1)?,
                    path: row.get(2)?,
                    format: rows::parsed(row, 3)?,
                    obsolete: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(resources)
    }

    /// Non-obsolete entities of a resource, in insertion order.
    pub fn entities(&self, resource_id: ResourceId) -> StorageResult<Vec<Entity>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities e
             WHERE e.resource_id = ?1 AND e.obsolete = 0 ORDER BY e.created_at, e.rowid"
        ))?;
        let entities = stmt
            .query_map(params![resource_id.to_string()], rows::entity)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    pub fn entity(&self, id: EntityId) -> StorageResult<Option<Entity>> {
        let conn = self.conn()?;
        let entity = conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities e WHERE e.id = ?1"),
                params![id.to_string()],
                rows::entity,
            )
            .optional()?;
        Ok(entity)
    }

    // ── Translations ─────────────────────────────────────────────

    /// Active translations for the live entities of a resource.
    pub fn active_translations(&self, resource_id: ResourceId, locale: &str) -> StorageResult<Vec<Translation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSLATION_COLUMNS} FROM translations t
             JOIN entities e ON e.id = t.entity_id
             WHERE e.resource_id = ?1 AND e.obsolete = 0 AND t.locale = ?2 AND t.active = 1"
        ))?;
        let translations = stmt
            .query_map(params![resource_id.to_string(), locale], rows::translation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(translations)
    }

    pub fn translation(&self, id: TranslationId) -> StorageResult<Option<Translation>> {
        let conn = self.conn()?;
        let translation = conn
            .query_row(
                &format!("SELECT {TRANSLATION_COLUMNS} FROM translations t WHERE t.id = ?1"),
                params![id.to_string()],
                rows::translation,
            )
            .optional()?;
        Ok(translation)
    }

    /// Full history of an entity in one locale, oldest first.
    pub fn translation_history(&self, entity_id: EntityId, locale: &str) -> StorageResult<Vec<Translation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSLATION_COLUMNS} FROM translations t
             WHERE t.entity_id = ?1 AND t.locale = ?2 ORDER BY t.created_at, t.rowid"
        ))?;
        let translations = stmt
            .query_map(params![entity_id.to_string(), locale], rows::translation)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(translations)
    }

    /// Number of translation rows, active or not.
    pub fn translation_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM translations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Approved, active translations of a project with their entities.
    pub fn approved_translations(&self, project_id: ProjectId) -> StorageResult<Vec<(Entity, Translation)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS}, {TRANSLATION_COLUMNS} FROM translations t
             JOIN entities e ON e.id = t.entity_id
             JOIN resources r ON r.id = e.resource_id
             WHERE r.project_id = ?1 AND e.obsolete = 0 AND t.active = 1 AND t.state = 'approved'"
        ))?;
        let pairs = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok((rows::entity(row)?, rows::translation_at(row, 7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pairs)
    }

    /// Records a human edit: the new translation replaces the active one
    /// and the pair is marked changed for the next sync.
    ///
    /// An unreviewed submission never displaces an approved translation. It
    /// is stored as an inactive suggestion until someone approves it.
    pub fn submit_translation(&self, translation: &Translation) -> StorageResult<()> {
        self.transaction(|w| {
            let detail = format!("superseded by {}", translation.id);
            if let Some(current) = w.active_translation(translation.entity_id, &translation.locale)? {
                if !translation.is_approved() && w.review_state(current)? == ReviewState::Approved {
                    let suggestion = Translation {
                        active: false,
                        ..translation.clone()
                    };
                    return w.insert_translation(&suggestion);
                }
                w.supersede_translation(current, &translation.author, &detail)?;
            }
            w.insert_translation(translation)?;
            w.mark_changed(translation.entity_id, &translation.locale)
        })
    }

    /// Approves a translation, making it the active one.
    pub fn approve_translation(&self, id: TranslationId, actor: &Actor) -> StorageResult<()> {
        self.transaction(|w| {
            let (entity_id, locale) = w.translation_target(id)?;
            if let Some(current) = w.active_translation(entity_id, &locale)? {
                if current != id {
                    w.supersede_translation(current, actor, &format!("superseded by {id}"))?;
                }
            }
            w.approve_translation(id, actor)?;
            w.mark_changed(entity_id, &locale)
        })
    }

    /// Physically removes a translation. The only hard delete.
    pub fn purge_translation(&self, id: TranslationId, actor: &Actor) -> StorageResult<()> {
        self.transaction(|w| w.purge_translation(id, actor))
    }

    // ── Changed markers ──────────────────────────────────────────

    /// `(entity, locale)` pairs changed in the database since the last sync.
    pub fn changed_markers(&self, project_id: ProjectId) -> StorageResult<BTreeSet<(EntityId, String)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.entity_id, c.locale FROM changed_entity_locale c
             JOIN entities e ON e.id = c.entity_id
             JOIN resources r ON r.id = e.resource_id
             WHERE r.project_id = ?1 AND e.obsolete = 0",
        )?;
        let markers: BTreeSet<(EntityId, String)> = stmt
            .query_map(params![project_id.to_string()], |row| {
                Ok((rows::parsed(row, 0)?, row.get(1)?))
            })?
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(markers)
    }

    // ── Baselines and exports ────────────────────────────────────

    /// Repository values recorded by the last sync, `None` if the
    /// resource has never been synced for `locale`.
    pub fn baseline(&self, resource_id: ResourceId, locale: &str) -> StorageResult<Option<BTreeMap<String, Message>>> {
        let conn = self.conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM baseline_sets WHERE resource_id = ?1 AND locale = ?2",
                params![resource_id.to_string(), locale],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        if !exists {
            return Ok(None);
        }
        let mut stmt = conn.prepare("SELECT key, value FROM baselines WHERE resource_id = ?1 AND locale = ?2")?;
        let values: BTreeMap<String, Message> = stmt
            .query_map(params![resource_id.to_string(), locale], |row| {
                Ok((row.get(0)?, rows::json(row, 1)?))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        Ok(Some(values))
    }

    /// When the database last wrote the locale file of a resource.
    pub fn last_export(&self, resource_id: ResourceId, locale: &str) -> StorageResult<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let at = conn
            .query_row(
                "SELECT exported_at FROM exports WHERE resource_id = ?1 AND locale = ?2",
                params![resource_id.to_string(), locale],
                |row| rows::time(row, 0),
            )
            .optional()?;
        Ok(at)
    }

    // ── Action log ───────────────────────────────────────────────

    /// Loads action log entries, newest first, with pagination.
    pub fn action_log(&self, limit: usize, offset: usize) -> StorageResult<Vec<ActionLogEntry>> {
        self.query_actions(
            "SELECT action, actor, translation_id, entity_id, locale, detail, created_at
             FROM action_log ORDER BY id DESC LIMIT ?1 OFFSET ?2",
            params![limit as i64, offset as i64],
        )
    }

    /// Entries about one translation, oldest first.
    pub fn actions_for_translation(&self, id: TranslationId) -> StorageResult<Vec<ActionLogEntry>> {
        self.query_actions(
            "SELECT action, actor, translation_id, entity_id, locale, detail, created_at
             FROM action_log WHERE translation_id = ?1 ORDER BY id",
            params![id.to_string()],
        )
    }

    /// Entries written by one sync run, oldest first.
    pub fn actions_for_sync(&self, sync_id: SyncId) -> StorageResult<Vec<ActionLogEntry>> {
        self.query_actions(
            "SELECT action, actor, translation_id, entity_id, locale, detail, created_at
             FROM action_log WHERE actor = ?1 ORDER BY id",
            params![Actor::Sync(sync_id).to_string()],
        )
    }

    pub fn action_log_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM action_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn query_actions(&self, sql: &str, params: impl rusqlite::Params) -> StorageResult<Vec<ActionLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, |row| {
                Ok(ActionLogEntry {
                    action: rows::parsed::<ActionType>(row, 0)?,
                    actor: rows::parsed(row, 1)?,
                    translation_id: rows::opt_parsed(row, 2)?,
                    entity_id: rows::opt_parsed(row, 3)?,
                    locale: row.get(4)?,
                    detail: row.get(5)?,
                    created_at: rows::time(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ── Sync runs ────────────────────────────────────────────────

    pub fn insert_sync_run(&self, run: &SyncRun) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (id, project_id, started_at, finished_at, status, error, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.id.to_string(),
                run.project_id.to_string(),
                millis(run.started_at),
                run.finished_at.map(millis),
                run.status.as_str(),
                run.error,
                serde_json::to_string(&run.summary)?,
            ],
        )?;
        debug!(sync_id = %run.id, "sync run started");
        Ok(())
    }

    /// Writes the terminal state of a run. A finalized run never changes again.
    pub fn finish_sync_run(&self, run: &SyncRun) -> StorageResult<()> {
        if !run.status.is_terminal() {
            return Err(StorageError::InvalidData(format!("sync run {} is not terminal", run.id)));
        }
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sync_runs SET finished_at = ?2, status = ?3, error = ?4, summary = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                run.id.to_string(),
                run.finished_at.map(millis),
                run.status.as_str(),
                run.error,
                serde_json::to_string(&run.summary)?,
                SyncStatus::InProgress.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound(format!("in-progress sync run {}", run.id)));
        }
        Ok(())
    }

    pub fn sync_run(&self, id: SyncId) -> StorageResult<Option<SyncRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                "SELECT id, project_id, started_at, finished_at, status, error, summary
                 FROM sync_runs WHERE id = ?1",
                params![id.to_string()],
                sync_run_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Most recent runs of a project, newest first.
    pub fn sync_runs(&self, project_id: ProjectId, limit: usize) -> StorageResult<Vec<SyncRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, started_at, finished_at, status, error, summary
             FROM sync_runs WHERE project_id = ?1 ORDER BY started_at DESC, rowid DESC LIMIT ?2",
        )?;
        let runs = stmt
            .query_map(params![project_id.to_string(), limit as i64], sync_run_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    pub fn latest_sync_run(&self, project_id: ProjectId) -> StorageResult<Option<SyncRun>> {
        Ok(self.sync_runs(project_id, 1)?.into_iter().next())
    }

    pub fn save_repository_log(&self, log: &RepositorySyncLog) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO repository_sync_logs (sync_id, url, revision, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(sync_id, url) DO UPDATE SET revision = excluded.revision,
                 finished_at = excluded.finished_at",
            params![
                log.sync_id.to_string(),
                log.url,
                log.revision,
                millis(log.started_at),
                log.finished_at.map(millis),
            ],
        )?;
        Ok(())
    }

    pub fn repository_logs(&self, sync_id: SyncId) -> StorageResult<Vec<RepositorySyncLog>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT sync_id, url, revision, started_at, finished_at
             FROM repository_sync_logs WHERE sync_id = ?1",
        )?;
        let logs = stmt
            .query_map(params![sync_id.to_string()], |row| {
                Ok(RepositorySyncLog {
                    sync_id: rows::parsed(row, 0)?,
                    url: row.get(1)?,
                    revision: row.get(2)?,
                    started_at: rows::time(row, 3)?,
                    finished_at: rows::opt_time(row, 4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }
}

fn sync_run_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncRun> {
    Ok(SyncRun {
        id: rows::parsed(row, 0)?,
        project_id: rows::parsed(row, 1)?,
        started_at: rows::time(row, 2)?,
        finished_at: rows::opt_time(row, 3)?,
        status: rows::parsed(row, 4)?,
        error: row.get(5)?,
        summary: rows::json(row, 6)?,
    })
}
