use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use locsync_formats::{Format, FormatContext};
use locsync_model::{ReviewState, SyncStatus, Translation};
use locsync_storage::{MemoryLockStore, Store};
use locsync_sync::{
    LocaleConfig, ProjectConfig, RepositoryConfig, SyncConfig, SyncError, SyncOrchestrator, SyncState,
};
use locsync_tm::TranslationMemory;
use locsync_types::{ActionType, Actor, EntityId, Locale, Message, ResourceId};
use locsync_vcs::{
    Checkout, CommitOutcome, PullOutcome, RepositoryClient, RevisionId, VcsError, VcsKind, VcsResult,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Repository client over a plain directory; records commits and pushes.
#[derive(Default)]
struct FakeRepo {
    pulls: AtomicUsize,
    pushes: AtomicUsize,
    commits: Mutex<Vec<Vec<PathBuf>>>,
    fail_pull: AtomicBool,
    fail_push: AtomicBool,
    changed: Mutex<Option<BTreeSet<PathBuf>>>,
    modified: Mutex<Option<DateTime<Utc>>>,
}

impl FakeRepo {
    fn commits(&self) -> Vec<Vec<PathBuf>> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryClient for FakeRepo {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn pull(&self, checkout: &Checkout, _since: Option<&RevisionId>) -> VcsResult<PullOutcome> {
        if self.fail_pull.load(Ordering::SeqCst) {
            return Err(VcsError::RepositoryUnavailable {
                url: checkout.url.clone(),
                detail: "connection refused".into(),
            });
        }
        let n = self.pulls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PullOutcome {
            revision: RevisionId::new(format!("pull-{n}")),
            changed_paths: self.changed.lock().unwrap().clone(),
            cloned: false,
        })
    }

    async fn commit(
        &self,
        _checkout: &Checkout,
        paths: &[PathBuf],
        _message: &str,
        _author: &str,
    ) -> VcsResult<CommitOutcome> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(paths.to_vec());
        Ok(CommitOutcome::Committed(RevisionId::new(format!("commit-{}", commits.len()))))
    }

    async fn push(&self, _checkout: &Checkout) -> VcsResult<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(VcsError::CommandFailed {
                command: "git push".into(),
                status: Some(1),
                stderr: "rejected".into(),
            });
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn last_modified(&self, _checkout: &Checkout, _path: &Path) -> VcsResult<Option<DateTime<Utc>>> {
        Ok(*self.modified.lock().unwrap())
    }
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    store: Store,
    repo: Arc<FakeRepo>,
    orchestrator: SyncOrchestrator,
    project: ProjectConfig,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    fn with_config(config: SyncConfig) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("repo");
        std::fs::create_dir_all(&root).unwrap();
        let store = Store::open_in_memory().unwrap();
        let repo = Arc::new(FakeRepo::default());
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            Arc::new(MemoryLockStore::new()),
            Arc::new(TranslationMemory::new()),
            config,
        )
        .with_repository_client(repo.clone());
        let project = ProjectConfig {
            slug: "demo".into(),
            name: "Demo".into(),
            source_locale: "en-US".into(),
            locales: vec![LocaleConfig::new(Locale::new("de"))],
            repository: RepositoryConfig {
                kind: VcsKind::Git,
                url: "https://example.com/demo".into(),
                branch: None,
                checkout: root.clone(),
                source_dir: "en-US".into(),
                locale_path: "{locale}".into(),
            },
        };
        Self {
            _dir: dir,
            root,
            store,
            repo,
            orchestrator,
            project,
        }
    }

    fn write(&self, path: &str, text: &str) {
        let path = self.root.join(path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn read(&self, path: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(path)).ok()
    }

    fn remove(&self, path: &str) {
        std::fs::remove_file(self.root.join(path)).unwrap();
    }

    async fn sync(&self) -> Result<locsync_model::SyncRun, SyncError> {
        self.orchestrator.sync_project(&self.project).await
    }

    fn resource(&self, path: &str) -> ResourceId {
        let project = self.store.project_by_slug("demo").unwrap().unwrap();
        self.store
            .resources(project.id)
            .unwrap()
            .into_iter()
            .find(|r| r.path == path)
            .unwrap()
            .id
    }

    fn entity(&self, path: &str, key: &str) -> EntityId {
        self.store
            .entities(self.resource(path))
            .unwrap()
            .into_iter()
            .find(|e| e.key == key)
            .unwrap()
            .id
    }

    fn active(&self, path: &str, locale: &str) -> Vec<Translation> {
        self.store.active_translations(self.resource(path), locale).unwrap()
    }

    /// A reviewer's approved edit made through the database.
    fn edit(&self, path: &str, key: &str, value: &str) -> Translation {
        let translation = Translation::new(
            self.entity(path, key),
            "de",
            Message::plain(value),
            Actor::User("reviewer".into()),
        )
        .approved();
        self.store.submit_translation(&translation).unwrap();
        translation
    }
}

// ── Source strings ────────────────────────────────────────────────

#[tokio::test]
async fn clean_pull_adds_entity_without_translations() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::Done);
    assert_eq!(run.summary.resources_added, 1);
    assert_eq!(run.summary.entities_added, 1);
    assert_eq!(h.store.translation_count().unwrap(), 0);
    let entities = h.store.entities(h.resource("app.properties")).unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].source, Message::plain("Hello"));
    assert_eq!(h.orchestrator.state("demo"), SyncState::Idle);
}

#[tokio::test]
async fn source_edits_update_and_obsolete_entities() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Bye\n");
    h.sync().await.unwrap();
    let hello = h.entity("app.properties", "hello");

    h.write("en-US/app.properties", "# Greeting\nhello = Hello there\n");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.entities_updated, 1);
    assert_eq!(run.summary.entities_obsoleted, 1);
    let entity = h.store.entity(hello).unwrap().unwrap();
    assert_eq!(entity.source, Message::plain("Hello there"));
    assert_eq!(entity.comment.as_deref(), Some("Greeting"));
    assert_eq!(h.store.entities(h.resource("app.properties")).unwrap().len(), 1);
}

#[tokio::test]
async fn vanished_resource_is_obsoleted() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("en-US/menu.properties", "open = Open\n");
    h.sync().await.unwrap();

    h.remove("en-US/menu.properties");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.resources_obsoleted, 1);
    assert_eq!(run.summary.entities_obsoleted, 1);
    let project = h.store.project_by_slug("demo").unwrap().unwrap();
    let menu = h
        .store
        .resources(project.id)
        .unwrap()
        .into_iter()
        .find(|r| r.path == "menu.properties")
        .unwrap();
    assert!(menu.obsolete);
}

#[tokio::test]
async fn small_batches_write_everything() {
    let h = Harness::with_config(SyncConfig {
        batch_size: 1,
        ..SyncConfig::default()
    });
    h.write("en-US/app.properties", "a = A\nb = B\nc = C\n");
    h.write("de/app.properties", "a = Ä\nb = Bé\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.entities_added, 3);
    assert_eq!(run.summary.translations_imported, 2);
    assert_eq!(h.active("app.properties", "de").len(), 2);
}

// ── Repository translations ──────────────────────────────────────

#[tokio::test]
async fn repository_translation_is_imported_approved() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.translations_imported, 1);
    let active = h.active("app.properties", "de");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value, Message::plain("Hallo"));
    assert!(active[0].is_approved());
    assert_eq!(active[0].author, Actor::Sync(run.id));

    let hits = h.orchestrator.translation_memory().search("Hello", "de", 80, 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.target, "Hallo");
}

#[tokio::test]
async fn repository_edit_supersedes_previous_import() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();
    let first = h.active("app.properties", "de")[0].clone();

    h.write("de/app.properties", "hello = Guten Tag\n");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.translations_imported, 1);
    assert_eq!(h.active("app.properties", "de")[0].value, Message::plain("Guten Tag"));
    let old = h.store.translation(first.id).unwrap().unwrap();
    assert!(!old.active);
    assert_eq!(old.state, ReviewState::Unreviewed);
    let hits = h.orchestrator.translation_memory().search("Hello", "de", 80, 5);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].entry.target, "Guten Tag");
}

#[tokio::test]
async fn repository_removal_deactivates_translation() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Bye\n");
    h.write("de/app.properties", "hello = Hallo\nbye = Tschüss\n");
    h.sync().await.unwrap();

    h.write("de/app.properties", "hello = Hallo\n");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.translations_removed, 1);
    let active = h.active("app.properties", "de");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value, Message::plain("Hallo"));
}

#[tokio::test]
async fn fuzzy_and_empty_entries_are_not_imported() {
    let h = Harness::new();
    h.write("en-US/app.pot", "msgid \"Save\"\nmsgstr \"\"\n\nmsgid \"Quit\"\nmsgstr \"\"\n");
    h.write(
        "de/app.po",
        "#, fuzzy\nmsgid \"Save\"\nmsgstr \"Sichern\"\n\nmsgid \"Quit\"\nmsgstr \"\"\n",
    );

    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.entities_added, 2);
    assert_eq!(run.summary.translations_imported, 0);
}

// ── Quality gate ─────────────────────────────────────────────────

#[tokio::test]
async fn quality_gate_rejects_long_candidate() {
    let h = Harness::new();
    h.write("en-US/app.properties", "# MAX_LENGTH: 10\ntitle = Short\n");
    h.write("de/app.properties", "title = abcdefghijklmno\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::Done);
    assert_eq!(run.summary.translations_rejected, 1);
    assert_eq!(run.summary.translations_imported, 0);
    let rejected = &run.summary.rejected_candidates[0];
    assert_eq!(rejected.key, "title");
    assert_eq!(rejected.locale, "de");
    assert!(rejected.findings[0].starts_with("pErrors"));
    assert_eq!(h.store.translation_count().unwrap(), 0);
    assert!(run.summary.render().contains("rejected"));

    let again = h.sync().await.unwrap();
    assert_eq!(again.status, SyncStatus::NoChanges);
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn second_run_without_changes_writes_nothing() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Bye\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();
    let translations = h.store.translation_count().unwrap();
    let actions = h.store.action_log_count().unwrap();

    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::NoChanges);
    assert_eq!(h.store.translation_count().unwrap(), translations);
    assert_eq!(h.store.action_log_count().unwrap(), actions);
    assert!(h.repo.commits().is_empty());
}

#[tokio::test]
async fn unreported_paths_are_not_reparsed() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.sync().await.unwrap();

    *h.repo.changed.lock().unwrap() = Some(BTreeSet::new());
    h.write("en-US/app.properties", "hello = Hello\nextra = Extra\n");
    let skipped = h.sync().await.unwrap();
    assert_eq!(skipped.status, SyncStatus::NoChanges);

    *h.repo.changed.lock().unwrap() = Some(BTreeSet::from([PathBuf::from("en-US/app.properties")]));
    let run = h.sync().await.unwrap();
    assert_eq!(run.summary.entities_added, 1);
}

// ── Database changes and export ──────────────────────────────────

#[tokio::test]
async fn database_edit_is_exported_and_committed() {
    let h = Harness::new();
    h.write("en-US/app.properties", "# Greeting\nhello = Hello\nbye = Bye\n");
    h.sync().await.unwrap();
    h.edit("app.properties", "hello", "Hallo");

    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::Done);
    assert_eq!(run.summary.files_committed, 1);
    assert_eq!(h.read("de/app.properties").as_deref(), Some("# Greeting\nhello = Hallo\n"));
    assert_eq!(h.repo.commits(), vec![vec![PathBuf::from("de/app.properties")]]);
    assert_eq!(h.repo.pushes.load(Ordering::SeqCst), 1);
    let project = h.store.project_by_slug("demo").unwrap().unwrap();
    assert!(h.store.changed_markers(project.id).unwrap().is_empty());
    assert!(h.store.last_export(h.resource("app.properties"), "de").unwrap().is_some());
    assert_eq!(
        h.store.repository_state(project.id, "https://example.com/demo").unwrap().last_revision.as_deref(),
        Some("commit-1")
    );

    let again = h.sync().await.unwrap();
    assert_eq!(again.status, SyncStatus::NoChanges);
    assert_eq!(h.repo.commits().len(), 1);
}

#[tokio::test]
async fn reverted_database_edit_is_not_exported() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();

    h.edit("app.properties", "hello", "Servus");
    h.edit("app.properties", "hello", "Hallo");
    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::NoChanges);
    assert!(h.repo.commits().is_empty());
}

#[tokio::test]
async fn unreviewed_suggestion_leaves_exported_file_alone() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Bye\n");
    h.write("de/app.properties", "hello = Hallo\nbye = Tschuess\n");
    h.sync().await.unwrap();

    let suggestion = Translation::new(
        h.entity("app.properties", "hello"),
        "de",
        Message::plain("Hallöchen"),
        Actor::User("contributor".into()),
    );
    h.store.submit_translation(&suggestion).unwrap();
    h.sync().await.unwrap();

    assert_eq!(h.read("de/app.properties").as_deref(), Some("hello = Hallo\nbye = Tschuess\n"));
    assert!(h.repo.commits().is_empty());
    let hello = h.entity("app.properties", "hello");
    let active: Vec<_> = h.active("app.properties", "de").into_iter().filter(|t| t.entity_id == hello).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value, Message::plain("Hallo"));
    assert!(active[0].is_approved());
}

#[tokio::test]
async fn unreviewed_active_translation_exports_repository_value() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Bye\n");
    h.write("de/app.properties", "hello = Hallo\nbye = Tschuess\n");
    h.sync().await.unwrap();

    let hello = h.entity("app.properties", "hello");
    let current = h.active("app.properties", "de").into_iter().find(|t| t.entity_id == hello).unwrap();
    let pending = Translation::new(hello, "de", Message::plain("Hallöchen"), Actor::User("contributor".into()));
    h.store
        .transaction(|w| {
            w.supersede_translation(current.id, &pending.author, "edited")?;
            w.insert_translation(&pending)?;
            w.mark_changed(hello, "de")
        })
        .unwrap();
    h.edit("app.properties", "bye", "Tschüss");

    h.sync().await.unwrap();

    assert_eq!(h.read("de/app.properties").as_deref(), Some("hello = Hallo\nbye = Tschüss\n"));
}

#[tokio::test]
async fn unrepresentable_database_value_is_not_exported() {
    let h = Harness::new();
    h.write("en-US/app.ftl", "hello = Hello\nbye = Bye\n");
    h.write("de/app.ftl", "hello = Hallo\nbye = Tschuess\n");
    h.sync().await.unwrap();

    h.edit("app.ftl", "hello", "open { brace");
    h.edit("app.ftl", "bye", "Tschüss");
    let run = h.sync().await.unwrap();

    let file = h.read("de/app.ftl").unwrap();
    assert!(file.contains("hello = Hallo\n"), "{file}");
    assert!(file.contains("bye = Tschüss\n"), "{file}");
    assert_eq!(run.summary.files_committed, 1);
    assert_eq!(run.summary.translations_rejected, 1);
    assert_eq!(run.summary.rejected_candidates[0].key, "hello");
    assert!(run.summary.rejected_candidates[0].findings[0].starts_with("pErrors"));
}

// ── Conflicts ────────────────────────────────────────────────────

#[tokio::test]
async fn conflict_before_any_export_goes_to_repository() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();

    let edit = h.edit("app.properties", "hello", "Servus");
    h.write("de/app.properties", "hello = Moin\n");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.conflicts_resolved, 1);
    assert_eq!(run.summary.translations_imported, 1);
    assert_eq!(h.active("app.properties", "de")[0].value, Message::plain("Moin"));
    let loser = h.store.translation(edit.id).unwrap().unwrap();
    assert_eq!(loser.state, ReviewState::Rejected);
    assert!(!loser.active);

    let actions = h.store.actions_for_sync(run.id).unwrap();
    let resolved: Vec<_> = actions.iter().filter(|a| a.action == ActionType::ConflictResolved).collect();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].translation_id, Some(edit.id));
    assert!(resolved[0].detail.contains("repository wins"));
    assert!(
        actions
            .iter()
            .any(|a| a.action == ActionType::TranslationRejected && a.translation_id == Some(edit.id))
    );
}

#[tokio::test]
async fn approved_database_translation_wins_after_export() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.sync().await.unwrap();
    h.edit("app.properties", "hello", "Hallo");
    h.sync().await.unwrap();

    h.edit("app.properties", "hello", "Servus");
    h.write("de/app.properties", "hello = Moin\n");
    *h.repo.modified.lock().unwrap() = Some(Utc::now() - ChronoDuration::days(1));
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.conflicts_resolved, 1);
    assert_eq!(run.summary.translations_imported, 0);
    assert_eq!(h.active("app.properties", "de")[0].value, Message::plain("Servus"));
    assert_eq!(h.read("de/app.properties").as_deref(), Some("hello = Servus\n"));
    let resolved = h
        .store
        .actions_for_sync(run.id)
        .unwrap()
        .into_iter()
        .find(|a| a.action == ActionType::ConflictResolved)
        .unwrap();
    assert!(resolved.detail.contains("database wins"));
}

#[tokio::test]
async fn newer_repository_edit_beats_exported_translation() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.sync().await.unwrap();
    h.edit("app.properties", "hello", "Hallo");
    h.sync().await.unwrap();

    h.edit("app.properties", "hello", "Servus");
    h.write("de/app.properties", "hello = Moin\n");
    *h.repo.modified.lock().unwrap() = Some(Utc::now() + ChronoDuration::minutes(5));
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.conflicts_resolved, 1);
    assert_eq!(h.active("app.properties", "de")[0].value, Message::plain("Moin"));
}

#[tokio::test]
async fn identical_edits_on_both_sides_converge() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();

    h.edit("app.properties", "hello", "Moin");
    h.write("de/app.properties", "hello = Moin\n");
    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.conflicts_resolved, 0);
    assert_eq!(run.status, SyncStatus::NoChanges);
    assert!(h.repo.commits().is_empty());
}

// ── Failures ─────────────────────────────────────────────────────

#[tokio::test]
async fn unavailable_repository_aborts_without_database_writes() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.repo.fail_pull.store(true, Ordering::SeqCst);

    let err = h.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::RepositoryUnavailable { .. }));
    let project = h.store.project_by_slug("demo").unwrap().unwrap();
    assert!(h.store.resources(project.id).unwrap().is_empty());
    let run = h.store.latest_sync_run(project.id).unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run.error.unwrap().contains("connection refused"));
    assert_eq!(h.orchestrator.state("demo"), SyncState::Aborted);

    h.repo.fail_pull.store(false, Ordering::SeqCst);
    let run = h.sync().await.unwrap();
    assert_eq!(run.status, SyncStatus::Done);
}

#[tokio::test]
async fn unparsable_resource_is_skipped() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("en-US/broken.ftl", "good = Fine\n{{{ not fluent\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.status, SyncStatus::Done);
    assert_eq!(run.summary.skipped_resources.len(), 1);
    assert_eq!(run.summary.skipped_resources[0].path, "broken.ftl");
    assert_eq!(run.summary.entities_added, 1);
    assert!(run.summary.render().contains("skipped broken.ftl"));
}

#[test]
fn parse_errors_become_skipped_resources() {
    let source = Format::Ftl
        .parse(b"{{{ not fluent\n", &FormatContext::default())
        .unwrap_err();
    let detail = source.to_string();
    let err = SyncError::FormatParse {
        path: "de/app.ftl".into(),
        locale: Some("de".into()),
        source,
    };

    assert_eq!(err.to_string(), format!("cannot parse de/app.ftl: {detail}"));
    let skipped = err.skipped_resource().unwrap();
    assert_eq!(skipped.path, "de/app.ftl");
    assert_eq!(skipped.locale.as_deref(), Some("de"));
    assert_eq!(skipped.error, detail);
    assert!(SyncError::Config("x".into()).skipped_resource().is_none());
}

#[tokio::test]
async fn unparsable_locale_file_keeps_its_markers() {
    let h = Harness::new();
    h.write("en-US/app.ftl", "hello = Hello\n");
    h.sync().await.unwrap();
    h.edit("app.ftl", "hello", "Hallo");
    h.write("de/app.ftl", "hello = Hallo\n{{{ not fluent\n");

    let run = h.sync().await.unwrap();

    assert_eq!(run.summary.skipped_resources[0].locale.as_deref(), Some("de"));
    let project = h.store.project_by_slug("demo").unwrap().unwrap();
    assert_eq!(h.store.changed_markers(project.id).unwrap().len(), 1);
}

#[tokio::test]
async fn failed_push_keeps_commit_for_next_run() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.sync().await.unwrap();
    h.edit("app.properties", "hello", "Hallo");
    h.repo.fail_push.store(true, Ordering::SeqCst);

    let err = h.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::PartialCommitFailure { .. }));
    let project = h.store.project_by_slug("demo").unwrap().unwrap();
    let run = h.store.latest_sync_run(project.id).unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run.summary.push_pending);
    assert_eq!(run.summary.files_committed, 1);
    let state = h.store.repository_state(project.id, "https://example.com/demo").unwrap();
    assert!(state.pending_push);
    assert!(h.store.changed_markers(project.id).unwrap().is_empty());

    h.repo.fail_push.store(false, Ordering::SeqCst);
    let retry = h.sync().await.unwrap();
    assert_eq!(retry.status, SyncStatus::NoChanges);
    assert_eq!(h.repo.pushes.load(Ordering::SeqCst), 1);
    assert_eq!(h.repo.commits().len(), 1);
    let state = h.store.repository_state(project.id, "https://example.com/demo").unwrap();
    assert!(!state.pending_push);
}

#[tokio::test]
async fn pending_push_failing_again_aborts_before_pull() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.sync().await.unwrap();
    h.edit("app.properties", "hello", "Hallo");
    h.repo.fail_push.store(true, Ordering::SeqCst);
    h.sync().await.unwrap_err();
    let pulls = h.repo.pulls.load(Ordering::SeqCst);

    let err = h.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::RepositoryUnavailable { .. }));
    assert_eq!(h.repo.pulls.load(Ordering::SeqCst), pulls);
}

// ── Mutual exclusion and cancellation ────────────────────────────

#[tokio::test]
async fn concurrent_runs_for_one_project_are_refused() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");

    let ticket = h.orchestrator.enqueue(h.project.clone()).unwrap();
    let second = h.orchestrator.enqueue(h.project.clone()).unwrap_err();
    let third = h.sync().await.unwrap_err();

    assert!(matches!(second, SyncError::LockContention { .. }));
    assert!(matches!(third, SyncError::LockContention { .. }));
    let run = ticket.wait().await.unwrap();
    assert_eq!(run.status, SyncStatus::Done);
    assert_eq!(h.store.sync_runs(run.project_id, 10).unwrap().len(), 1);

    let next = h.sync().await.unwrap();
    assert_eq!(next.status, SyncStatus::NoChanges);
}

#[tokio::test]
async fn different_projects_run_concurrently() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    let mut other = h.project.clone();
    other.slug = "other".into();

    let first = h.orchestrator.enqueue(h.project.clone()).unwrap();
    let second = h.orchestrator.enqueue(other).unwrap();

    assert_eq!(first.wait().await.unwrap().status, SyncStatus::Done);
    assert_eq!(second.wait().await.unwrap().status, SyncStatus::Done);
}

#[tokio::test]
async fn enqueued_run_is_visible_before_it_finishes() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");

    let ticket = h.orchestrator.enqueue(h.project.clone()).unwrap();

    let pending = h.store.sync_run(ticket.sync_id).unwrap().unwrap();
    assert_eq!(pending.status, SyncStatus::InProgress);
    assert!(h.orchestrator.state("demo").is_active());
    assert_eq!(h.orchestrator.active_projects(), vec!["demo".to_string()]);
    ticket.wait().await.unwrap();
    let done = h.store.sync_run(pending.id).unwrap().unwrap();
    assert_eq!(done.status, SyncStatus::Done);
}

#[tokio::test]
async fn cancelled_run_stops_at_stage_boundary() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");

    let ticket = h.orchestrator.enqueue(h.project.clone()).unwrap();
    let sync_id = ticket.sync_id;
    ticket.cancel();
    let err = ticket.wait().await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled { stage: SyncState::Pulling }));
    assert_eq!(h.repo.pulls.load(Ordering::SeqCst), 0);
    let run = h.store.sync_run(sync_id).unwrap().unwrap();
    assert_eq!(run.status, SyncStatus::Failed);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn shutdown_token_cancels_every_run() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.orchestrator.cancel_token().cancel();

    let err = h.sync().await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled { .. }));
}

#[tokio::test]
async fn invalid_project_is_refused_before_locking() {
    let h = Harness::new();
    let mut project = h.project.clone();
    project.repository.source_dir = String::new();

    let err = h.orchestrator.sync_project(&project).await.unwrap_err();

    assert!(matches!(err, SyncError::Config(_)));
    assert!(h.store.project_by_slug("demo").unwrap().is_none());
}

// ── Translation memory ───────────────────────────────────────────

fn memory_targets(h: &Harness, text: &str) -> Vec<String> {
    h.orchestrator
        .translation_memory()
        .search(text, "de", 90, 5)
        .into_iter()
        .map(|m| m.entry.target)
        .collect()
}

#[tokio::test]
async fn database_approval_replaces_memory_entry() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\n");
    h.write("de/app.properties", "hello = Hallo\n");
    h.sync().await.unwrap();
    assert_eq!(memory_targets(&h, "Hello"), vec!["Hallo"]);

    h.edit("app.properties", "hello", "Servus");
    h.sync().await.unwrap();

    assert_eq!(memory_targets(&h, "Hello"), vec!["Servus"]);
}

#[tokio::test]
async fn translation_memory_rebuilds_from_approved_translations() {
    let h = Harness::new();
    h.write("en-US/app.properties", "hello = Hello\nbye = Goodbye\n");
    h.write("de/app.properties", "hello = Hallo\nbye = Auf Wiedersehen\n");
    h.sync().await.unwrap();

    let fresh = SyncOrchestrator::new(
        h.store.clone(),
        Arc::new(MemoryLockStore::new()),
        Arc::new(TranslationMemory::new()),
        SyncConfig::default(),
    );
    assert_eq!(fresh.rebuild_translation_memory("demo").unwrap(), 2);
    assert_eq!(fresh.rebuild_translation_memory("missing").unwrap(), 0);
    let hits = fresh.translation_memory().search("Goodbye", "de", 90, 5);
    assert_eq!(hits[0].entry.target, "Auf Wiedersehen");
}
