//! Repository clients for locsync.
//!
//! A [`RepositoryClient`] keeps a local working copy of a remote repository
//! in sync: it pulls (cloning when needed), commits exported files and
//! pushes. Git, Mercurial and Subversion are supported; all of them shell
//! out through a [`CommandRunner`].

mod error;
mod git;
mod hg;
mod runner;
mod svn;

pub use error::{VcsError, VcsResult};
pub use git::GitClient;
pub use hg::HgClient;
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use svn::SvnClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifier of a repository revision (commit hash or revision number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub String);

impl RevisionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported version control systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Hg,
    Svn,
}

impl VcsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::Hg => "hg",
            Self::Svn => "svn",
        }
    }
}

impl fmt::Display for VcsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote repository and the local directory it is checked out into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    pub url: String,
    pub branch: Option<String>,
    pub path: PathBuf,
}

impl Checkout {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            branch: None,
            path: path.into(),
        }
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Directory the checkout command runs in.
    pub(crate) fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub(crate) fn path_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    /// Revision the working copy is now at.
    pub revision: RevisionId,
    /// Paths changed since the requested revision, relative to the
    /// checkout root. `None` when unknown (fresh checkout, no previous
    /// revision, or the history lookup failed).
    pub changed_paths: Option<BTreeSet<PathBuf>>,
    /// True if the working copy had to be created from scratch.
    pub cloned: bool,
}

/// Result of a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(RevisionId),
    NothingToCommit,
}

/// Operations on a local working copy of a remote repository.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    fn kind(&self) -> VcsKind;

    /// Brings the working copy up to date, discarding local modifications.
    ///
    /// Falls back to a fresh checkout when updating fails. Fails with
    /// [`VcsError::RepositoryUnavailable`] when that fails too.
    async fn pull(&self, checkout: &Checkout, since: Option<&RevisionId>) -> VcsResult<PullOutcome>;

    /// Commits `paths` (relative to the checkout root) with `message`.
    ///
    /// `author` is `"Name <email>"`.
    async fn commit(
        &self,
        checkout: &Checkout,
        paths: &[PathBuf],
        message: &str,
        author: &str,
    ) -> VcsResult<CommitOutcome>;

    /// Publishes local commits. A no-op for centralized systems.
    async fn push(&self, checkout: &Checkout) -> VcsResult<()>;

    /// Time of the last commit touching `path`, if any.
    async fn last_modified(&self, checkout: &Checkout, path: &Path) -> VcsResult<Option<DateTime<Utc>>>;
}

/// Creates the client for `kind`.
pub fn client_for(kind: VcsKind, runner: Arc<dyn CommandRunner>) -> Arc<dyn RepositoryClient> {
    match kind {
        VcsKind::Git => Arc::new(GitClient::new(runner)),
        VcsKind::Hg => Arc::new(HgClient::new(runner)),
        VcsKind::Svn => Arc::new(SvnClient::new(runner)),
    }
}

/// Thin wrapper running one VCS program through a runner.
#[derive(Clone)]
pub(crate) struct Tool {
    program: &'static str,
    runner: Arc<dyn CommandRunner>,
}

impl Tool {
    pub(crate) fn new(program: &'static str, runner: Arc<dyn CommandRunner>) -> Self {
        Self { program, runner }
    }

    /// Runs and returns the output whatever the exit code.
    pub(crate) async fn output(&self, cwd: &Path, args: &[&str]) -> VcsResult<CommandOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(self.program, &args, cwd).await
    }

    /// Runs and fails on a non-zero exit.
    pub(crate) async fn run(&self, cwd: &Path, args: &[&str]) -> VcsResult<CommandOutput> {
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner
            .run(self.program, &owned, cwd)
            .await?
            .check(self.program, &owned)
    }

    /// Runs and returns trimmed stdout.
    pub(crate) async fn stdout(&self, cwd: &Path, args: &[&str]) -> VcsResult<String> {
        Ok(self.run(cwd, args).await?.stdout.trim().to_string())
    }

    pub(crate) fn unexpected(&self, args: &[&str], output: &str) -> VcsError {
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        VcsError::UnexpectedOutput {
            command: runner::display_command(self.program, &owned),
            output: output.to_string(),
        }
    }
}

/// Parses newline-separated relative paths.
pub(crate) fn path_set(output: &str) -> BTreeSet<PathBuf> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// Splits `"Name <email>"` into its parts.
pub(crate) fn split_author(author: &str) -> (&str, &str) {
    match author.split_once('<') {
        Some((name, rest)) => (name.trim(), rest.trim_end_matches('>').trim()),
        None => (author.trim(), ""),
    }
}

pub(crate) fn unavailable(checkout: &Checkout, err: VcsError) -> VcsError {
    VcsError::RepositoryUnavailable {
        url: checkout.url.clone(),
        detail: err.to_string(),
    }
}

/// Creates the parent directory of a checkout and removes a broken one.
pub(crate) async fn prepare_fresh_checkout(checkout: &Checkout) -> VcsResult<()> {
    if tokio::fs::try_exists(&checkout.path).await? {
        tokio::fs::remove_dir_all(&checkout.path).await?;
    }
    tokio::fs::create_dir_all(checkout.parent()).await?;
    Ok(())
}
