//! Mercurial working copies.

use crate::{
    Checkout, CommandRunner, CommitOutcome, PullOutcome, RepositoryClient, RevisionId, Tool,
    VcsKind, VcsResult, path_set, prepare_fresh_checkout, unavailable,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// `hg commit` and `hg push` exit with 1 when there is nothing to do.
const NOTHING_CHANGED: Option<i32> = Some(1);

pub struct HgClient {
    hg: Tool,
}

impl HgClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            hg: Tool::new("hg", runner),
        }
    }

    async fn update(&self, checkout: &Checkout) -> VcsResult<()> {
        let dir = &checkout.path;
        self.hg.run(dir, &["pull"]).await?;
        let rev = checkout.branch.as_deref().unwrap_or("tip");
        self.hg.run(dir, &["update", "--clean", "-r", rev]).await?;
        self.hg.run(dir, &["purge", "--config", "extensions.purge="]).await?;
        Ok(())
    }

    async fn fresh_clone(&self, checkout: &Checkout) -> VcsResult<()> {
        prepare_fresh_checkout(checkout).await?;
        let path = checkout.path_arg();
        let mut args = vec!["clone"];
        if let Some(branch) = &checkout.branch {
            args.extend(["-u", branch.as_str()]);
        }
        args.extend([checkout.url.as_str(), path.as_str()]);
        self.hg.run(checkout.parent(), &args).await?;
        Ok(())
    }

    async fn head(&self, dir: &Path) -> VcsResult<RevisionId> {
        let node = self.hg.stdout(dir, &["log", "-r", ".", "--template", "{node}"]).await?;
        Ok(RevisionId::new(node))
    }
}

#[async_trait]
impl RepositoryClient for HgClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Hg
    }

    async fn pull(&self, checkout: &Checkout, since: Option<&RevisionId>) -> VcsResult<PullOutcome> {
        let existing = tokio::fs::try_exists(checkout.path.join(".hg"))
            .await
            .unwrap_or(false);
        let updated = existing
            && match self.update(checkout).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(url = %checkout.url, error = %err, "hg update failed, cloning afresh");
                    false
                }
            };
        let cloned = !updated;
        if cloned {
            self.fresh_clone(checkout).await.map_err(|e| unavailable(checkout, e))?;
            info!(url = %checkout.url, path = %checkout.path.display(), "cloned repository");
        }
        let revision = self.head(&checkout.path).await?;
        let changed_paths = match since {
            Some(since) if !cloned && since != &revision => {
                let out = self
                    .hg
                    .output(
                        &checkout.path,
                        &["status", "--rev", since.as_str(), "--rev", ".", "--no-status"],
                    )
                    .await?;
                out.success().then(|| path_set(&out.stdout))
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
        let mut add = vec!["add"];
        add.extend(names.iter().map(String::as_str));
        // Already tracked files make `hg add` exit non-zero.
        self.hg.output(dir, &add).await?;

        let mut commit = vec!["commit", "-m", message, "-u", author];
        commit.extend(names.iter().map(String::as_str));
        let out = self.hg.output(dir, &commit).await?;
        if out.status == NOTHING_CHANGED {
            return Ok(CommitOutcome::NothingToCommit);
        }
        let owned: Vec<String> = commit.iter().map(|a| a.to_string()).collect();
        out.check("hg", &owned)?;
        Ok(CommitOutcome::Committed(self.head(dir).await?))
    }

    async fn push(&self, checkout: &Checkout) -> VcsResult<()> {
        let out = self.hg.output(&checkout.path, &["push"]).await?;
        if out.status == NOTHING_CHANGED {
            return Ok(());
        }
        out.check("hg", &["push".to_string()])?;
        Ok(())
    }

    async fn last_modified(&self, checkout: &Checkout, path: &Path) -> VcsResult<Option<DateTime<Utc>>> {
        let path = path.to_string_lossy();
        let args = ["log", "-l", "1", "--template", "{date|hgdate}", path.as_ref()];
        let out = self.hg.stdout(&checkout.path, &args).await?;
        let Some(secs) = out.split_whitespace().next() else {
            return Ok(None);
        };
        let secs: i64 = secs.parse().map_err(|_| self.hg.unexpected(&args, &out))?;
        Ok(DateTime::from_timestamp(secs, 0))
    }
}
