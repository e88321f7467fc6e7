//! Per-project sync pipeline.
//!
//! The orchestrator owns all I/O. A run takes the project lock, pulls the
//! repository, reads everything it needs, decides, and only then writes:
//! first the database, then the repository. The lock is renewed at every
//! stage boundary, where cancellation and the run-time cap are checked too.

use crate::config::{ProjectConfig, SyncConfig};
use crate::conflict::{Conflict, ConflictResolver, Winner};
use crate::diff::{Change, DiffEngine, SourceString, ThreeWay};
use crate::error::{SyncError, SyncResult};
use crate::plan::{
    Import, LocalePlan, ProjectPlan, Removal, Replaced, ResourcePlan, WriteOp, apply_batched,
    repository_values,
};
use crate::state::{StateBoard, SyncState};
use chrono::Utc;
use locsync_checks::{QualityChecker, has_errors};
use locsync_formats::{Format, FormatContext, FormatError};
use locsync_model::{
    Entity, Project, RejectedCandidate, RepositorySyncLog, Resource, SyncRun,
    SyncStatus, SyncSummary, Translation,
};
use locsync_storage::{LockStore, LockToken, RepositoryState, Store};
use locsync_tm::{TmEntry, TranslationMemory};
use locsync_types::{
    ActionLogEntry, ActionType, Actor, EntityId, Locale, ProjectId, SyncId, TranslationId,
};
use locsync_vcs::{
    Checkout, CommandRunner, CommitOutcome, PullOutcome, RepositoryClient, RevisionId, SystemRunner,
    VcsError, client_for,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Cooperative cancellation, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a run started with [`SyncOrchestrator::enqueue`].
#[derive(Debug)]
pub struct SyncTicket {
    pub sync_id: SyncId,
    pub project: String,
    cancel: CancelToken,
    handle: JoinHandle<SyncResult<SyncRun>>,
}

impl SyncTicket {
    /// Asks the run to stop at its next stage boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run to finish.
    pub async fn wait(self) -> SyncResult<SyncRun> {
        self.handle.await.map_err(|e| SyncError::Task(e.to_string()))?
    }
}

/// A run that holds its lock and has a `SyncRun` row.
struct Started {
    token: LockToken,
    project_id: ProjectId,
    run: SyncRun,
}

/// Per-run state threaded through the stages.
struct RunContext<'a> {
    project: &'a ProjectConfig,
    project_id: ProjectId,
    sync_id: SyncId,
    actor: Actor,
    token: LockToken,
    started: Instant,
    cancel: CancelToken,
    summary: SyncSummary,
    repository_log: Option<RepositorySyncLog>,
}

/// Runs sync pipelines, at most one per project at a time.
#[derive(Clone)]
pub struct SyncOrchestrator {
    store: Store,
    locks: Arc<dyn LockStore>,
    tm: Arc<TranslationMemory>,
    config: SyncConfig,
    runner: Arc<dyn CommandRunner>,
    client: Option<Arc<dyn RepositoryClient>>,
    checker: QualityChecker,
    resolver: ConflictResolver,
    states: StateBoard,
    shutdown: CancelToken,
}

impl SyncOrchestrator {
    pub fn new(
        store: Store,
        locks: Arc<dyn LockStore>,
        tm: Arc<TranslationMemory>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            locks,
            tm,
            config,
            runner: Arc::new(SystemRunner),
            client: None,
            checker: QualityChecker::new(),
            resolver: ConflictResolver::new(),
            states: StateBoard::new(),
            shutdown: CancelToken::new(),
        }
    }

    /// Runs VCS commands through `runner`.
    #[must_use]
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Uses `client` for every project regardless of its VCS kind.
    #[must_use]
    pub fn with_repository_client(mut self, client: Arc<dyn RepositoryClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn translation_memory(&self) -> &Arc<TranslationMemory> {
        &self.tm
    }

    /// Cancelling this token stops every run at its next stage boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.shutdown.clone()
    }

    /// Current pipeline state of `project` in this process.
    pub fn state(&self, project: &str) -> SyncState {
        self.states.get(project)
    }

    /// Projects with a run in progress in this process.
    pub fn active_projects(&self) -> Vec<String> {
        self.states.active()
    }

    /// Fills the translation memory from approved translations.
    pub fn rebuild_translation_memory(&self, project: &str) -> SyncResult<usize> {
        let Some(record) = self.store.project_by_slug(project)? else {
            return Ok(0);
        };
        let entries: Vec<TmEntry> = self
            .store
            .approved_translations(record.id)?
            .iter()
            .map(|(entity, translation)| TmEntry::from_translation(entity, translation))
            .collect();
        let count = entries.len();
        self.tm.rebuild(entries);
        Ok(count)
    }

    /// Syncs `project` and waits for the run to finish.
    ///
    /// Fails with [`SyncError::LockContention`] without side effects if a
    /// run for the project is in progress. Any other error is returned after
    /// the run was recorded as failed.
    pub async fn sync_project(&self, project: &ProjectConfig) -> SyncResult<SyncRun> {
        let started = self.begin(project)?;
        self.run(project, started, CancelToken::new()).await
    }

    /// Starts a run in the background.
    ///
    /// The lock is taken before returning, so contention is reported here;
    /// the ticket's `sync_id` can be polled in the store right away.
    pub fn enqueue(&self, project: ProjectConfig) -> SyncResult<SyncTicket> {
        let started = self.begin(&project)?;
        let sync_id = started.run.id;
        let cancel = CancelToken::new();
        let orchestrator = self.clone();
        let token = cancel.clone();
        let slug = project.slug.clone();
        let handle = tokio::spawn(async move { orchestrator.run(&project, started, token).await });
        Ok(SyncTicket {
            sync_id,
            project: slug,
            cancel,
            handle,
        })
    }

    // ── Run lifecycle ────────────────────────────────────────────

    fn begin(&self, project: &ProjectConfig) -> SyncResult<Started> {
        project.validate()?;
        let lock = self.config.lock_name(&project.slug);
        let token = self
            .locks
            .acquire(&lock, self.config.lock_ttl)?
            .ok_or_else(|| SyncError::LockContention {
                project: project.slug.clone(),
            })?;
        match self.open_run(project) {
            Ok((project_id, run)) => {
                self.states.set(&project.slug, SyncState::Locked);
                info!(project = %project.slug, sync = %run.id, "sync started");
                Ok(Started {
                    token,
                    project_id,
                    run,
                })
            }
            Err(e) => {
                self.release(&token);
                Err(e)
            }
        }
    }

    fn open_run(&self, project: &ProjectConfig) -> SyncResult<(ProjectId, SyncRun)> {
        let record = match self.store.project_by_slug(&project.slug)? {
            Some(mut existing) => {
                if existing.name != project.display_name() || existing.source_locale != project.source_locale {
                    existing.name = project.display_name().to_string();
                    existing.source_locale = project.source_locale.clone();
                    self.store.save_project(&existing)?;
                }
                existing
            }
            None => {
                let record = Project {
                    id: ProjectId::new(),
                    slug: project.slug.clone(),
                    name: project.display_name().to_string(),
                    source_locale: project.source_locale.clone(),
                };
                self.store.save_project(&record)?;
                record
            }
        };
        let run = SyncRun::start(record.id);
        self.store.insert_sync_run(&run)?;
        Ok((record.id, run))
    }

    async fn run(&self, project: &ProjectConfig, started: Started, cancel: CancelToken) -> SyncResult<SyncRun> {
        let Started {
            token,
            project_id,
            mut run,
        } = started;
        let mut ctx = RunContext {
            project,
            project_id,
            sync_id: run.id,
            actor: Actor::Sync(run.id),
            token,
            started: Instant::now(),
            cancel,
            summary: SyncSummary::default(),
            repository_log: None,
        };

        let outcome = self.pipeline(&mut ctx).await;
        if outcome.is_ok() {
            self.states.set(&project.slug, SyncState::Finalizing);
        }

        run.finished_at = Some(Utc::now());
        run.status = match &outcome {
            Err(_) => SyncStatus::Failed,
            Ok(()) if ctx.summary.has_changes() => SyncStatus::Done,
            Ok(()) => SyncStatus::NoChanges,
        };
        run.error = outcome.as_ref().err().map(ToString::to_string);
        run.summary = std::mem::take(&mut ctx.summary);

        let mut recorded = self.store.finish_sync_run(&run);
        if let Some(mut log) = ctx.repository_log.take() {
            log.finished_at = run.finished_at;
            if let Err(e) = self.store.save_repository_log(&log) {
                recorded = recorded.and(Err(e));
            }
        }
        self.release(&ctx.token);

        let report = run.summary.render();
        match &outcome {
            Ok(()) => {
                self.states.set(&project.slug, SyncState::Idle);
                info!(project = %project.slug, sync = %run.id, status = %run.status, "sync finished\n{report}");
            }
            Err(e) => {
                self.states.set(&project.slug, SyncState::Aborted);
                warn!(project = %project.slug, sync = %run.id, error = %e, "sync failed\n{report}");
            }
        }

        outcome?;
        recorded?;
        Ok(run)
    }

    fn release(&self, token: &LockToken) {
        if let Err(e) = self.locks.release(token) {
            warn!(lock = %token.name, error = %e, "failed to release sync lock");
        }
    }

    /// Stage boundary: cancellation, time cap, lock renewal.
    fn enter(&self, ctx: &RunContext<'_>, stage: SyncState) -> SyncResult<()> {
        if ctx.cancel.is_cancelled() || self.shutdown.is_cancelled() {
            return Err(SyncError::Cancelled { stage });
        }
        if ctx.started.elapsed() > self.config.max_run_duration {
            return Err(SyncError::TimeLimit {
                limit: self.config.max_run_duration,
                stage,
            });
        }
        if !self.locks.renew(&ctx.token, self.config.lock_ttl)? {
            return Err(SyncError::LockLost {
                project: ctx.project.slug.clone(),
            });
        }
        self.states.set(&ctx.project.slug, stage);
        debug!(project = %ctx.project.slug, stage = %stage, "entering stage");
        Ok(())
    }

    fn client(&self, project: &ProjectConfig) -> Arc<dyn RepositoryClient> {
        match &self.client {
            Some(client) => client.clone(),
            None => client_for(project.repository.kind, self.runner.clone()),
        }
    }

    async fn pipeline(&self, ctx: &mut RunContext<'_>) -> SyncResult<()> {
        let client = self.client(ctx.project);
        let checkout = ctx.project.checkout();

        self.enter(ctx, SyncState::Pulling)?;
        let mut repo_state = self.store.repository_state(ctx.project_id, &checkout.url)?;
        let pull = self.pull(&*client, &checkout, &mut repo_state).await?;
        info!(
            project = %ctx.project.slug,
            revision = %pull.revision,
            changed = ?pull.changed_paths.as_ref().map(BTreeSet::len),
            "repository pulled"
        );
        let log = RepositorySyncLog {
            sync_id: ctx.sync_id,
            url: checkout.url.clone(),
            revision: Some(pull.revision.to_string()),
            started_at: Utc::now(),
            finished_at: None,
        };
        self.store.save_repository_log(&log)?;
        ctx.repository_log = Some(log);

        self.enter(ctx, SyncState::Diffing)?;
        let mut plan = self.read_project(ctx, &checkout, &pull).await?;

        self.enter(ctx, SyncState::Merging)?;
        self.merge(ctx, &*client, &checkout, &mut plan).await?;

        self.enter(ctx, SyncState::Checking)?;
        self.check(ctx, &mut plan);

        self.enter(ctx, SyncState::Committing)?;
        repo_state.last_revision = Some(pull.revision.to_string());
        self.write_database(ctx, &plan)?;
        match self.write_repository(ctx, &*client, &checkout, &mut plan, &mut repo_state).await {
            Ok(()) => self.record_sync_point(ctx, &plan, &repo_state),
            Err(e @ SyncError::PartialCommitFailure { .. }) => {
                warn!(project = %ctx.project.slug, error = %e, "push failed, keeping local commit");
                self.record_sync_point(ctx, &plan, &repo_state)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // ── Pulling ──────────────────────────────────────────────────

    async fn pull(
        &self,
        client: &dyn RepositoryClient,
        checkout: &Checkout,
        state: &mut RepositoryState,
    ) -> SyncResult<PullOutcome> {
        if state.pending_push {
            info!(url = %checkout.url, "pushing commit left by a previous run");
            client.push(checkout).await.map_err(|e| unavailable(checkout, e))?;
            state.pending_push = false;
        }
        let since = state.last_revision.as_deref().map(RevisionId::new);
        client
            .pull(checkout, since.as_ref())
            .await
            .map_err(|e| unavailable(checkout, e))
    }

    // ── Diffing ──────────────────────────────────────────────────

    async fn read_project(
        &self,
        ctx: &mut RunContext<'_>,
        checkout: &Checkout,
        pull: &PullOutcome,
    ) -> SyncResult<ProjectPlan> {
        let project = ctx.project;
        let source_root = checkout.path.join(&project.repository.source_dir);
        if !source_root.is_dir() {
            return Err(SyncError::Config(format!(
                "{}: source directory {} not found in the checkout",
                project.slug,
                source_root.display()
            )));
        }
        let discovered = discover(&source_root)?;
        let mut known: BTreeMap<String, Resource> = self
            .store
            .resources(ctx.project_id)?
            .into_iter()
            .map(|r| (r.path.clone(), r))
            .collect();
        let markers = self.store.changed_markers(ctx.project_id)?;

        let mut plan = ProjectPlan::default();
        for (path, format) in discovered {
            let existing = known.remove(&path);
            if let Some(resource) = self.read_resource(ctx, checkout, pull, &markers, path, format, existing).await? {
                plan.resources.push(resource);
            }
        }
        for resource in known.into_values().filter(|r| !r.obsolete) {
            let entities = self.store.entities(resource.id)?;
            info!(project = %project.slug, path = %resource.path, "resource removed upstream");
            plan.vanished.push((resource.id, entities.iter().map(|e| e.id).collect()));
        }
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    async fn read_resource(
        &self,
        ctx: &mut RunContext<'_>,
        checkout: &Checkout,
        pull: &PullOutcome,
        markers: &BTreeSet<(EntityId, String)>,
        path: String,
        format: Format,
        existing: Option<Resource>,
    ) -> SyncResult<Option<ResourcePlan>> {
        let project = ctx.project;
        let created = existing.is_none();
        let resource = existing.unwrap_or_else(|| Resource::new(ctx.project_id, path.clone(), format));
        let entities: BTreeMap<String, Entity> = if created {
            BTreeMap::new()
        } else {
            self.store
                .entities(resource.id)?
                .into_iter()
                .map(|e| (e.key.clone(), e))
                .collect()
        };
        let ids: BTreeSet<_> = entities.values().map(|e| e.id).collect();
        let resource_markers: BTreeSet<_> = markers.iter().filter(|(id, _)| ids.contains(id)).cloned().collect();

        let source_file = project.source_file(&path);
        if !created && !resource.obsolete && resource_markers.is_empty() {
            if let Some(changed) = &pull.changed_paths {
                let touched = changed.contains(&source_file)
                    || project.locales.iter().any(|l| changed.contains(&project.locale_file(&path, l)));
                if !touched && self.has_baselines(&resource, project)? {
                    debug!(project = %project.slug, %path, "resource unchanged, skipped");
                    return Ok(None);
                }
            }
        }

        let source_bytes = tokio::fs::read(checkout.path.join(&source_file)).await?;
        let source_ctx = FormatContext::for_locale(Locale::new(project.source_locale.clone()));
        let parsed = match format.parse(&source_bytes, &source_ctx) {
            Ok(parsed) => parsed,
            Err(e) => {
                skip_file(&mut ctx.summary, path, None, e);
                return Ok(None);
            }
        };

        let current: BTreeMap<String, SourceString> = parsed
            .units()
            .map(|u| {
                let source = u.source.clone().unwrap_or_else(|| u.value.clone());
                (u.key.clone(), SourceString {
                    source,
                    comment: u.comment.clone(),
                })
            })
            .collect();
        let stored: BTreeMap<String, SourceString> = entities
            .iter()
            .map(|(k, e)| {
                (k.clone(), SourceString {
                    source: e.source.clone(),
                    comment: e.comment.clone(),
                })
            })
            .collect();
        let source_changes = DiffEngine::diff(&stored, &current);

        let mut live = entities.clone();
        for key in source_changes.removed.keys() {
            live.remove(key);
        }
        for (key, (_, after)) in &source_changes.modified {
            if let Some(entity) = live.get_mut(key) {
                entity.source = after.source.clone();
                entity.comment = after.comment.clone();
            }
        }
        for (key, added) in &source_changes.added {
            let entity = Entity::new(resource.id, key.clone(), added.source.clone()).with_comment(added.comment.clone());
            live.insert(key.clone(), entity);
        }

        let keys_by_id: BTreeMap<_, _> = entities.values().map(|e| (e.id, e.key.clone())).collect();
        let mut locales = Vec::new();
        for locale in &project.locales {
            let file = project.locale_file(&path, locale);
            let locale_ctx = FormatContext::for_locale(locale.locale.clone());
            let repository = match read_optional(&checkout.path.join(&file)).await? {
                None => BTreeMap::new(),
                Some(bytes) => match format.parse(&bytes, &locale_ctx) {
                    Ok(parsed) => repository_values(&parsed, &live),
                    Err(e) => {
                        skip_file(&mut ctx.summary, file.to_string_lossy().into_owned(), Some(locale.code()), e);
                        continue;
                    }
                },
            };
            let (baseline, database) = if created {
                (BTreeMap::new(), BTreeMap::new())
            } else {
                let baseline: BTreeMap<String, _> = self
                    .store
                    .baseline(resource.id, locale.code())?
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|(k, _)| live.contains_key(k))
                    .collect();
                let database: BTreeMap<String, Translation> = self
                    .store
                    .active_translations(resource.id, locale.code())?
                    .into_iter()
                    .filter_map(|t| keys_by_id.get(&t.entity_id).cloned().map(|k| (k, t)))
                    .filter(|(k, _)| live.contains_key(k))
                    .collect();
                (baseline, database)
            };
            let marked: BTreeSet<String> = resource_markers
                .iter()
                .filter(|(_, code)| code == locale.code())
                .filter_map(|(id, _)| keys_by_id.get(id).cloned())
                .collect();
            let values: BTreeMap<String, _> = database.iter().map(|(k, t)| (k.clone(), t.value.clone())).collect();
            let deltas = DiffEngine::three_way(ThreeWay {
                baseline: &baseline,
                repository: &repository,
                database: &values,
                marked: &marked,
            });
            locales.push(LocalePlan {
                locale: locale.clone(),
                file,
                repository,
                database,
                deltas,
                imports: Vec::new(),
                removals: Vec::new(),
                resolutions: Vec::new(),
                export: false,
                exported_at: None,
            });
        }

        Ok(Some(ResourcePlan {
            resource,
            created,
            source_bytes,
            entities,
            live,
            source_changes,
            locales,
            markers: resource_markers,
        }))
    }

    fn has_baselines(&self, resource: &Resource, project: &ProjectConfig) -> SyncResult<bool> {
        for locale in &project.locales {
            if self.store.baseline(resource.id, locale.code())?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    // ── Merging ──────────────────────────────────────────────────

    async fn merge(
        &self,
        ctx: &mut RunContext<'_>,
        client: &dyn RepositoryClient,
        checkout: &Checkout,
        plan: &mut ProjectPlan,
    ) -> SyncResult<()> {
        for rp in &mut plan.resources {
            for lp in &mut rp.locales {
                let deltas = std::mem::take(&mut lp.deltas);
                let mut file_times = None;
                for delta in &deltas {
                    let key = delta.key.as_str();
                    let active = lp.database.get(key);
                    match &delta.change {
                        Change::Repository { value: Some(value) } => {
                            if active.is_some_and(|t| &t.value == value) {
                                continue;
                            }
                            lp.imports.push(Import {
                                key: key.to_string(),
                                value: value.clone(),
                                replaces: active.map(|t| Replaced {
                                    id: t.id,
                                    reject: false,
                                    detail: "replaced by repository edit".into(),
                                }),
                            });
                        }
                        Change::Repository { value: None } => {
                            if let Some(t) = active {
                                lp.removals.push(Removal {
                                    key: key.to_string(),
                                    replaced: Replaced {
                                        id: t.id,
                                        reject: false,
                                        detail: "removed from repository".into(),
                                    },
                                });
                            }
                        }
                        Change::Database => lp.export = true,
                        Change::Converged => {}
                        Change::Conflict { repository, .. } => {
                            let (modified, exported) = match file_times {
                                Some(times) => times,
                                None => {
                                    let modified = client
                                        .last_modified(checkout, &lp.file)
                                        .await
                                        .unwrap_or_else(|e| {
                                            warn!(file = %lp.file.display(), error = %e, "cannot read file history");
                                            None
                                        });
                                    let exported = self.store.last_export(rp.resource.id, lp.code())?;
                                    *file_times.insert((modified, exported))
                                }
                            };
                            let conflict = Conflict {
                                key,
                                locale: lp.code(),
                                source_locale: false,
                                repository: repository.as_ref(),
                                database: active,
                                repository_modified: modified,
                                last_export: exported,
                            };
                            let resolution = self.resolver.resolve(&conflict);
                            let detail = resolution.describe(&conflict);
                            debug!(project = %ctx.project.slug, %detail, "conflict resolved");
                            ctx.summary.conflicts_resolved += 1;

                            let mut entry = ActionLogEntry::new(ActionType::ConflictResolved, ctx.actor.clone())
                                .locale(lp.code())
                                .detail(detail.clone());
                            if let Some(entity) = rp.live.get(key) {
                                entry = entry.entity(entity.id);
                            }
                            if let Some(t) = active {
                                entry = entry.translation(t.id);
                            }
                            lp.resolutions.push(entry);

                            match (resolution.winner, repository) {
                                (Winner::Database, _) => lp.export = true,
                                (Winner::Repository, Some(value)) => lp.imports.push(Import {
                                    key: key.to_string(),
                                    value: value.clone(),
                                    replaces: active.map(|t| Replaced {
                                        id: t.id,
                                        reject: true,
                                        detail: detail.clone(),
                                    }),
                                }),
                                (Winner::Repository, None) => {
                                    if let Some(t) = active {
                                        lp.removals.push(Removal {
                                            key: key.to_string(),
                                            replaced: Replaced {
                                                id: t.id,
                                                reject: true,
                                                detail,
                                            },
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
                lp.deltas = deltas;
            }
        }
        Ok(())
    }

    // ── Checking ─────────────────────────────────────────────────

    fn check(&self, ctx: &mut RunContext<'_>, plan: &mut ProjectPlan) {
        for rp in &mut plan.resources {
            let format = rp.resource.format;
            for lp in &mut rp.locales {
                let candidates = std::mem::take(&mut lp.imports);
                for import in candidates {
                    let Some(entity) = rp.live.get(&import.key) else {
                        continue;
                    };
                    let findings = self.checker.check(format, entity, &import.value);
                    if has_errors(&findings) {
                        debug!(key = %import.key, locale = lp.code(), "candidate rejected");
                        ctx.summary.translations_rejected += 1;
                        ctx.summary.rejected_candidates.push(RejectedCandidate {
                            path: lp.file.to_string_lossy().into_owned(),
                            key: import.key,
                            locale: lp.code().to_string(),
                            findings: findings.iter().map(ToString::to_string).collect(),
                        });
                        continue;
                    }
                    for finding in &findings {
                        debug!(key = %import.key, locale = lp.code(), %finding, "candidate accepted with warning");
                    }
                    lp.imports.push(import);
                }
            }
        }
    }

    // ── Committing ───────────────────────────────────────────────

    fn write_database(&self, ctx: &mut RunContext<'_>, plan: &ProjectPlan) -> SyncResult<()> {
        let mut ops = Vec::new();
        let mut memory: Vec<(Option<TmEntry>, Option<TranslationId>)> = Vec::new();
        let summary = &mut ctx.summary;

        for (resource_id, entity_ids) in &plan.vanished {
            ops.push(WriteOp::ObsoleteResource(*resource_id));
            ops.extend(entity_ids.iter().map(|id| WriteOp::ObsoleteEntity(*id)));
            summary.resources_obsoleted += 1;
            summary.entities_obsoleted += entity_ids.len();
        }

        for rp in &plan.resources {
            if rp.created {
                ops.push(WriteOp::InsertResource(rp.resource.clone()));
                summary.resources_added += 1;
            } else if rp.resource.obsolete {
                ops.push(WriteOp::ReviveResource(rp.resource.id));
            }

            let changes = &rp.source_changes;
            for key in changes.removed.keys() {
                if let Some(entity) = rp.entities.get(key) {
                    ops.push(WriteOp::ObsoleteEntity(entity.id));
                    summary.entities_obsoleted += 1;
                }
            }
            for key in changes.modified.keys() {
                if let Some(entity) = rp.live.get(key) {
                    ops.push(WriteOp::UpdateEntity {
                        id: entity.id,
                        source: entity.source.clone(),
                        comment: entity.comment.clone(),
                    });
                    summary.entities_updated += 1;
                }
            }
            for key in changes.added.keys() {
                if let Some(entity) = rp.live.get(key) {
                    ops.push(WriteOp::InsertEntity(entity.clone()));
                    summary.entities_added += 1;
                }
            }

            for lp in &rp.locales {
                for import in &lp.imports {
                    let Some(entity) = rp.live.get(&import.key) else {
                        continue;
                    };
                    let translation =
                        Translation::new(entity.id, lp.code(), import.value.clone(), ctx.actor.clone()).approved();
                    memory.push((
                        Some(TmEntry::from_translation(entity, &translation)),
                        import.replaces.as_ref().map(|r| r.id),
                    ));
                    ops.push(WriteOp::Import {
                        translation,
                        replaces: import.replaces.clone(),
                    });
                    summary.translations_imported += 1;
                }
                for removal in &lp.removals {
                    debug!(key = %removal.key, locale = lp.code(), "translation removed upstream");
                    memory.push((None, Some(removal.replaced.id)));
                    ops.push(WriteOp::Remove(removal.replaced.clone()));
                    summary.translations_removed += 1;
                }
                ops.extend(lp.resolutions.iter().cloned().map(WriteOp::Log));
            }
        }

        if !ops.is_empty() {
            debug!(project = %ctx.project.slug, ops = ops.len(), "writing database changes");
            apply_batched(&self.store, &ops, &ctx.actor, self.config.batch_size)?;
        }

        for (entry, displaced) in memory {
            if let Some(id) = displaced {
                self.tm.remove(id);
            }
            if let Some(entry) = entry {
                self.tm.index(entry);
            }
        }
        self.refresh_memory(plan)
    }

    /// Re-indexes the pairs edited in the database since the last run.
    /// Only the active approved translation of a pair stays in memory.
    fn refresh_memory(&self, plan: &ProjectPlan) -> SyncResult<()> {
        for rp in &plan.resources {
            let live: BTreeMap<EntityId, &Entity> = rp.live.values().map(|e| (e.id, e)).collect();
            for (entity_id, locale) in &rp.markers {
                let Some(entity) = live.get(entity_id) else {
                    continue;
                };
                if !rp.locales.iter().any(|lp| lp.code() == locale) {
                    continue;
                }
                for translation in self.store.translation_history(*entity_id, locale)? {
                    if translation.active && translation.is_approved() {
                        self.tm.index(TmEntry::from_translation(entity, &translation));
                    } else {
                        self.tm.remove(translation.id);
                    }
                }
            }
        }
        Ok(())
    }

    /// Exports database changes into locale files, then commits and pushes.
    async fn write_repository(
        &self,
        ctx: &mut RunContext<'_>,
        client: &dyn RepositoryClient,
        checkout: &Checkout,
        plan: &mut ProjectPlan,
        repo_state: &mut RepositoryState,
    ) -> SyncResult<()> {
        let mut written: Vec<PathBuf> = Vec::new();
        let mut locales: BTreeSet<String> = BTreeSet::new();

        for rp in &mut plan.resources {
            let format = rp.resource.format;
            let keys_by_id = rp.keys_by_id();
            let sources: BTreeMap<String, _> = rp.live.iter().map(|(k, e)| (k.clone(), e.source.clone())).collect();
            for lp in rp.locales.iter_mut().filter(|lp| lp.export) {
                let file = lp.file.to_string_lossy().into_owned();
                // Keys whose translation awaits review or fails the checks
                // keep their repository value.
                let mut translations = BTreeMap::new();
                for t in self.store.active_translations(rp.resource.id, lp.code())? {
                    let Some((key, entity)) = keys_by_id.get(&t.entity_id).and_then(|k| rp.live.get_key_value(k))
                    else {
                        continue;
                    };
                    let exportable = t.is_approved() && {
                        let findings = self.checker.check(format, entity, &t.value);
                        if has_errors(&findings) {
                            warn!(%file, %key, locale = lp.code(), "translation not exported");
                            ctx.summary.translations_rejected += 1;
                            ctx.summary.rejected_candidates.push(RejectedCandidate {
                                path: file.clone(),
                                key: key.clone(),
                                locale: lp.code().to_string(),
                                findings: findings.iter().map(ToString::to_string).collect(),
                            });
                        }
                        !has_errors(&findings)
                    };
                    if exportable {
                        translations.insert(key.clone(), t.value);
                    } else if let Some(value) = lp.repository.get(key) {
                        translations.insert(key.clone(), value.clone());
                    }
                }
                let locale_ctx = FormatContext::for_locale(lp.locale.locale.clone());
                let bytes = match format.merge_with_template(&rp.source_bytes, &translations, &sources, &locale_ctx) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        skip_file(&mut ctx.summary, file, Some(lp.code()), e);
                        continue;
                    }
                };
                // The written file must read back.
                let parsed = match format.parse(&bytes, &locale_ctx) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        skip_file(&mut ctx.summary, file, Some(lp.code()), e);
                        continue;
                    }
                };

                let target = checkout.path.join(&lp.file);
                if read_optional(&target).await?.as_deref() != Some(bytes.as_slice()) {
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&target, &bytes).await?;
                    written.push(lp.file.clone());
                    locales.insert(lp.code().to_string());
                }
                lp.exported_at = Some(Utc::now());
                lp.repository = repository_values(&parsed, &rp.live);
            }
        }

        if written.is_empty() {
            return Ok(());
        }
        let locales: Vec<String> = locales.into_iter().collect();
        let message = self
            .config
            .render_commit_message(ctx.project.display_name(), &locales);
        let revision = match client
            .commit(checkout, &written, &message, &self.config.commit_author)
            .await?
        {
            CommitOutcome::Committed(revision) => revision,
            CommitOutcome::NothingToCommit => return Ok(()),
        };
        info!(project = %ctx.project.slug, %revision, files = written.len(), "committed locale files");
        ctx.summary.files_committed = written.len();
        ctx.summary.revision = Some(revision.to_string());
        repo_state.last_revision = Some(revision.to_string());

        match client.push(checkout).await {
            Ok(()) => Ok(()),
            Err(e) => {
                repo_state.pending_push = true;
                ctx.summary.push_pending = true;
                Err(SyncError::PartialCommitFailure {
                    revision: revision.to_string(),
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Baselines, export times, markers and the synced revision, in one
    /// transaction.
    fn record_sync_point(&self, ctx: &RunContext<'_>, plan: &ProjectPlan, repo_state: &RepositoryState) -> SyncResult<()> {
        let url = &ctx.project.repository.url;
        self.store.transaction(|w| {
            for rp in &plan.resources {
                let synced: BTreeSet<&str> = rp.locales.iter().map(LocalePlan::code).collect();
                for lp in &rp.locales {
                    w.replace_baseline(rp.resource.id, lp.code(), &lp.repository)?;
                    if let Some(at) = lp.exported_at {
                        w.record_export(rp.resource.id, lp.code(), at)?;
                    }
                }
                for (entity_id, locale) in &rp.markers {
                    if synced.contains(locale.as_str()) {
                        w.clear_changed(*entity_id, locale)?;
                    }
                }
            }
            w.set_repository_state(ctx.project_id, url, repo_state)
        })?;
        Ok(())
    }
}

/// Leaves a file out of the run; the rest of the project still syncs.
fn skip_file(summary: &mut SyncSummary, path: String, locale: Option<&str>, source: FormatError) {
    let error = SyncError::FormatParse {
        path,
        locale: locale.map(str::to_string),
        source,
    };
    warn!(%error, "file skipped");
    summary.skipped_resources.extend(error.skipped_resource());
}

fn unavailable(checkout: &Checkout, error: VcsError) -> SyncError {
    match error {
        VcsError::RepositoryUnavailable { url, detail } => SyncError::RepositoryUnavailable { url, detail },
        other => SyncError::RepositoryUnavailable {
            url: checkout.url.clone(),
            detail: other.to_string(),
        },
    }
}

/// Supported files under `root`, keyed by `/`-separated relative path.
/// Hidden files and directories are ignored.
fn discover(root: &Path) -> SyncResult<BTreeMap<String, Format>> {
    let mut found = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(format) = Format::from_path(entry.path()) else {
            continue;
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        found.insert(path, format);
    }
    Ok(found)
}

async fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
