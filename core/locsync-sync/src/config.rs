//! Pipeline and project configuration.

use crate::error::{SyncError, SyncResult};
use locsync_storage::DEFAULT_BATCH_SIZE;
use locsync_types::Locale;
use locsync_vcs::{Checkout, VcsKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder for the locale code in path templates.
pub const LOCALE_PLACEHOLDER: &str = "{locale}";

/// Configuration for the sync orchestrator.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Lock names are `"{pipeline_name}:{project}"`.
    pub pipeline_name: String,
    /// Lock expiry, renewed at every stage transition.
    pub lock_ttl: Duration,
    /// Runs older than this abort at the next stage boundary.
    pub max_run_duration: Duration,
    /// Maximum write operations per database transaction.
    pub batch_size: usize,
    /// `"Name <email>"` used for repository commits.
    pub commit_author: String,
    /// Commit message; `{project}` and `{locales}` are substituted.
    pub commit_message: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            pipeline_name: "sync-project".to_string(),
            lock_ttl: Duration::from_secs(10 * 60),
            max_run_duration: Duration::from_secs(60 * 60),
            batch_size: DEFAULT_BATCH_SIZE,
            commit_author: "locsync <locsync@localhost>".to_string(),
            commit_message: "Update {project} translations ({locales})".to_string(),
        }
    }
}

impl SyncConfig {
    pub fn lock_name(&self, project: &str) -> String {
        format!("{}:{}", self.pipeline_name, project)
    }

    pub fn render_commit_message(&self, project: &str, locales: &[String]) -> String {
        self.commit_message
            .replace("{project}", project)
            .replace("{locales}", &locales.join(", "))
    }
}

fn default_locale_path() -> String {
    LOCALE_PLACEHOLDER.to_string()
}

/// Where a project's repository lives and how its files are laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub kind: VcsKind,
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Local working copy directory.
    pub checkout: PathBuf,
    /// Source-locale files, relative to the checkout root. Must not be
    /// the root itself, which would also hold the locale directories.
    pub source_dir: String,
    /// Directory of a locale's files, relative to the checkout root.
    #[serde(default = "default_locale_path")]
    pub locale_path: String,
}

/// A target locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleConfig {
    #[serde(flatten)]
    pub locale: Locale,
    /// Overrides the repository's `locale_path` for this locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl LocaleConfig {
    pub fn new(locale: Locale) -> Self {
        Self { locale, path: None }
    }

    pub fn code(&self) -> &str {
        &self.locale.code
    }
}

/// A project kept in sync between its repository and the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub source_locale: String,
    #[serde(default)]
    pub locales: Vec<LocaleConfig>,
    pub repository: RepositoryConfig,
}

impl ProjectConfig {
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let project: Self = serde_json::from_str(json)?;
        project.validate()?;
        Ok(project)
    }

    pub fn load(path: &Path) -> SyncResult<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.slug.trim().is_empty() {
            return Err(SyncError::Config("project slug is empty".into()));
        }
        if self.repository.url.trim().is_empty() {
            return Err(SyncError::Config(format!("{}: repository url is empty", self.slug)));
        }
        if self.repository.source_dir.trim_matches(['/', '.']).is_empty() {
            return Err(SyncError::Config(format!(
                "{}: source directory must be a subdirectory of the checkout",
                self.slug
            )));
        }
        let mut seen = HashSet::new();
        for locale in &self.locales {
            if locale.code() == self.source_locale {
                return Err(SyncError::Config(format!(
                    "{}: source locale {} listed as a target",
                    self.slug, self.source_locale
                )));
            }
            if !seen.insert(locale.code()) {
                return Err(SyncError::Config(format!(
                    "{}: duplicate locale {}",
                    self.slug,
                    locale.code()
                )));
            }
            if locale.path.is_none() && !self.repository.locale_path.contains(LOCALE_PLACEHOLDER) {
                return Err(SyncError::Config(format!(
                    "{}: locale path {:?} lacks {LOCALE_PLACEHOLDER}",
                    self.slug, self.repository.locale_path
                )));
            }
        }
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.slug } else { &self.name }
    }

    pub fn checkout(&self) -> Checkout {
        let checkout = Checkout::new(self.repository.url.clone(), self.repository.checkout.clone());
        match &self.repository.branch {
            Some(branch) => checkout.with_branch(branch.clone()),
            None => checkout,
        }
    }

    /// Checkout-relative path of a resource's source file.
    pub fn source_file(&self, resource_path: &str) -> PathBuf {
        Path::new(&self.repository.source_dir).join(resource_path)
    }

    /// Checkout-relative path of a resource's file for `locale`.
    ///
    /// gettext templates (`.pot`) are written as `.po` files.
    pub fn locale_file(&self, resource_path: &str, locale: &LocaleConfig) -> PathBuf {
        let dir = match &locale.path {
            Some(path) => path.clone(),
            None => self.repository.locale_path.replace(LOCALE_PLACEHOLDER, locale.code()),
        };
        let file = Path::new(&dir).join(resource_path);
        if file.extension().is_some_and(|ext| ext == "pot") {
            file.with_extension("po")
        } else {
            file
        }
    }
}
