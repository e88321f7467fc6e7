//! Subversion working copies.
//!
//! Subversion commits go straight to the server, so [`push`] does nothing.
//!
//! [`push`]: crate::RepositoryClient::push

use crate::{
    Checkout, CommandRunner, CommitOutcome, PullOutcome, RepositoryClient, RevisionId, Tool,
    VcsKind, VcsResult, prepare_fresh_checkout, unavailable,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SvnClient {
    svn: Tool,
}

/// Paths from `svn diff --summarize`: a status column, whitespace, path.
fn summarized_paths(output: &str) -> BTreeSet<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.split_once(char::is_whitespace))
        .map(|(_, path)| PathBuf::from(path.trim()))
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

impl SvnClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            svn: Tool::new("svn", runner),
        }
    }

    async fn update(&self, checkout: &Checkout) -> VcsResult<()> {
        let dir = &checkout.path;
        self.svn.run(dir, &["revert", "-R", "."]).await?;
        self.svn
            .run(dir, &["update", "--accept", "theirs-full", "--non-interactive"])
            .await?;
        Ok(())
    }

    async fn fresh_checkout(&self, checkout: &Checkout) -> VcsResult<()> {
        prepare_fresh_checkout(checkout).await?;
        let path = checkout.path_arg();
        self.svn
            .run(
                checkout.parent(),
                &["checkout", "--non-interactive", checkout.url.as_str(), path.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn head(&self, dir: &Path) -> VcsResult<RevisionId> {
        let rev = self.svn.stdout(dir, &["info", "--show-item", "revision"]).await?;
        Ok(RevisionId::new(rev))
    }
}

#[async_trait]
impl RepositoryClient for SvnClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Svn
    }

    async fn pull(&self, checkout: &Checkout, since: Option<&RevisionId>) -> VcsResult<PullOutcome> {
        let existing = tokio::fs::try_exists(checkout.path.join(".svn"))
            .await
            .unwrap_or(false);
        let updated = existing
            && match self.update(checkout).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(url = %checkout.url, error = %err, "svn update failed, checking out afresh");
                    false
                }
            };
        let cloned = !updated;
        if cloned {
            self.fresh_checkout(checkout)
                .await
                .map_err(|e| unavailable(checkout, e))?;
            info!(url = %checkout.url, path = %checkout.path.display(), "checked out repository");
        }
        let revision = self.head(&checkout.path).await?;
        let changed_paths = match since {
            Some(since) if !cloned && since != &revision => {
                let range = format!("{since}:{revision}");
                let out = self
                    .svn
                    .output(&checkout.path, &["diff", "--summarize", "-r", &range])
                    .await?;
                out.success().then(|| summarized_paths(&out.stdout))
            }
            Some(_) if !cloned => Some(Default::default()),
            _ => None,
        };
        Ok(PullOutcome {
            revision,
            changed_paths,
            cloned,
        })
    }

    async fn commit(
        &self,
        checkout: &Checkout,
        paths: &[PathBuf],
        message: &str,
        author: &str,
    ) -> VcsResult<CommitOutcome> {
        let dir = &checkout.path;
        let names: Vec<String> = paths.iter().map(|p| p.to_string_lossy().into_owned()).collect();
        let mut add = vec!["add", "--force", "--parents"];
        add.extend(names.iter().map(String::as_str));
        self.svn.run(dir, &add).await?;

        let mut status = vec!["status", "-q"];
        status.extend(names.iter().map(String::as_str));
        if self.svn.stdout(dir, &status).await?.is_empty() {
            return Ok(CommitOutcome::NothingToCommit);
        }
        let author_prop = format!("locsync:author={author}");
        let mut commit = vec![
            "commit",
            "--non-interactive",
            "-m",
            message,
            "--with-revprop",
            author_prop.as_str(),
        ];
        commit.extend(names.iter().map(String::as_str));
        self.svn.run(dir, &commit).await?;
        Ok(CommitOutcome::Committed(self.head(dir).await?))
    }

    async fn push(&self, _checkout: &Checkout) -> VcsResult<()> {
        Ok(())
    }

    async fn last_modified(&self, checkout: &Checkout, path: &Path) -> VcsResult<Option<DateTime<Utc>>> {
        let path = path.to_string_lossy();
        let args = ["info", "--show-item", "last-changed-date", path.as_ref()];
        let out = self.svn.output(&checkout.path, &args).await?;
        let date = out.stdout.trim();
        if !out.success() || date.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(date)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|_| self.svn.unexpected(&args, date))
    }
}
