//! Configuration and operations behind the `locsync-worker` binary.

use anyhow::{Context, Result, bail};
use locsync_model::SyncRun;
use locsync_storage::Store;
use locsync_sync::{ProjectConfig, SyncConfig, SyncOrchestrator, SyncResult};
use locsync_tm::{TmEntry, TmMatch, TranslationMemory};
use locsync_vcs::RepositoryClient;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Optional overrides of [`SyncConfig`]; durations in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOverrides {
    pub pipeline_name: Option<String>,
    pub lock_ttl_secs: Option<u64>,
    pub max_run_secs: Option<u64>,
    pub batch_size: Option<usize>,
    pub commit_author: Option<String>,
    pub commit_message: Option<String>,
}

impl SyncOverrides {
    pub fn apply(&self, mut config: SyncConfig) -> SyncConfig {
        if let Some(name) = &self.pipeline_name {
            config.pipeline_name = name.clone();
        }
        if let Some(secs) = self.lock_ttl_secs {
            config.lock_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.max_run_secs {
            config.max_run_duration = Duration::from_secs(secs);
        }
        if let Some(size) = self.batch_size {
            config.batch_size = size;
        }
        if let Some(author) = &self.commit_author {
            config.commit_author = author.clone();
        }
        if let Some(message) = &self.commit_message {
            config.commit_message = message.clone();
        }
        config
    }
}

/// The worker's configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// SQLite database file.
    pub database: PathBuf,
    /// Root for relative checkout directories. Defaults to the directory
    /// holding the configuration file.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncOverrides,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

impl WorkerConfig {
    /// Reads and validates the configuration at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let base = path.parent().unwrap_or(Path::new("."));
        Self::from_json(&text, base).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses `json`, resolving relative paths against `base`.
    pub fn from_json(json: &str, base: &Path) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json).context("Failed to parse config")?;
        let workdir = match config.workdir.take() {
            Some(dir) if dir.is_relative() => base.join(dir),
            Some(dir) => dir,
            None => base.to_path_buf(),
        };
        if config.database.is_relative() {
            config.database = workdir.join(&config.database);
        }
        let mut slugs = HashSet::new();
        for project in &mut config.projects {
            if project.repository.checkout.is_relative() {
                project.repository.checkout = workdir.join(&project.repository.checkout);
            }
            project
                .validate()
                .with_context(|| format!("Invalid project {}", project.slug))?;
            if !slugs.insert(project.slug.clone()) {
                bail!("Project {} is configured twice", project.slug);
            }
        }
        config.workdir = Some(workdir);
        Ok(config)
    }

    pub fn project(&self, slug: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.slug == slug)
    }

    pub fn sync_config(&self) -> SyncConfig {
        self.sync.apply(SyncConfig::default())
    }
}

/// Outcome of one requested sync.
#[derive(Debug)]
pub struct SyncOutcome {
    pub project: String,
    pub result: SyncResult<SyncRun>,
}

/// What `status` reports for a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub project: String,
    pub state: String,
    pub last_revision: Option<String>,
    pub pending_push: bool,
    pub latest_run: Option<SyncRun>,
}

/// A store, an orchestrator and the configured projects.
pub struct Worker {
    config: WorkerConfig,
    orchestrator: SyncOrchestrator,
}

impl Worker {
    /// Opens the database named by `config`, creating it if needed.
    pub fn open(config: WorkerConfig) -> Result<Self> {
        if let Some(parent) = config.database.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let store = Store::open(&config.database)
            .with_context(|| format!("Failed to open database {}", config.database.display()))?;
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: WorkerConfig, store: Store) -> Self {
        let locks = Arc::new(store.lock_store());
        let orchestrator = SyncOrchestrator::new(
            store,
            locks,
            Arc::new(TranslationMemory::new()),
            config.sync_config(),
        );
        Self { config, orchestrator }
    }

    /// Uses `client` instead of the client for each project's VCS kind.
    #[must_use]
    pub fn with_repository_client(mut self, client: Arc<dyn RepositoryClient>) -> Self {
        self.orchestrator = self.orchestrator.with_repository_client(client);
        self
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// Slugs of every configured project.
    pub fn all_projects(&self) -> Vec<String> {
        self.config.projects.iter().map(|p| p.slug.clone()).collect()
    }

    /// Syncs `slugs` concurrently and waits for all of them.
    ///
    /// Unknown slugs fail before anything runs.
    pub async fn sync(&self, slugs: &[String]) -> Result<Vec<SyncOutcome>> {
        let mut projects = Vec::with_capacity(slugs.len());
        for slug in slugs {
            let project = self
                .config
                .project(slug)
                .with_context(|| format!("Unknown project {slug}"))?;
            projects.push(project.clone());
        }

        let mut pending = Vec::with_capacity(projects.len());
        for project in projects {
            let slug = project.slug.clone();
            pending.push((slug, self.orchestrator.enqueue(project)));
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for (project, enqueued) in pending {
            let result = match enqueued {
                Ok(ticket) => ticket.wait().await,
                Err(e) => Err(e),
            };
            match &result {
                Ok(run) => info!(project = %project, status = %run.status, "sync complete"),
                Err(e) => warn!(project = %project, error = %e, "sync failed"),
            }
            outcomes.push(SyncOutcome { project, result });
        }
        Ok(outcomes)
    }

    /// Latest run and repository state of `slug`.
    pub fn status(&self, slug: &str) -> Result<StatusReport> {
        let project = self
            .config
            .project(slug)
            .with_context(|| format!("Unknown project {slug}"))?;
        let store = self.orchestrator.store();
        let mut report = StatusReport {
            project: slug.to_string(),
            state: self.orchestrator.state(slug).to_string(),
            last_revision: None,
            pending_push: false,
            latest_run: None,
        };
        let Some(record) = store.project_by_slug(slug)? else {
            return Ok(report);
        };
        let repository = store.repository_state(record.id, &project.repository.url)?;
        report.last_revision = repository.last_revision;
        report.pending_push = repository.pending_push;
        report.latest_run = store.latest_sync_run(record.id)?;
        Ok(report)
    }

    /// Searches a translation memory built from every configured project's
    /// approved translations.
    pub fn suggest(&self, locale: &str, text: &str, min_quality: u8, limit: usize) -> Result<Vec<TmMatch>> {
        let store = self.orchestrator.store();
        let mut entries = Vec::new();
        for project in &self.config.projects {
            let Some(record) = store.project_by_slug(&project.slug)? else {
                continue;
            };
            entries.extend(
                store
                    .approved_translations(record.id)?
                    .iter()
                    .filter(|(_, t)| t.locale == locale)
                    .map(|(entity, translation)| TmEntry::from_translation(entity, translation)),
            );
        }
        let tm = self.orchestrator.translation_memory();
        tm.rebuild(entries);
        info!(locale, entries = tm.len(), "translation memory loaded");
        Ok(tm.search(text, locale, min_quality, limit))
    }
}
