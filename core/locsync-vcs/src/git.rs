//! Git working copies.

use crate::{
    Checkout, CommandRunner, CommitOutcome, PullOutcome, RepositoryClient, RevisionId, Tool,
    VcsKind, VcsResult, path_set, prepare_fresh_checkout, split_author, unavailable,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct GitClient {
    git: Tool,
}

impl GitClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            git: Tool::new("git", runner),
        }
    }

    async fn update(&self, checkout: &Checkout) -> VcsResult<()> {
        let dir = &checkout.path;
        self.git.run(dir, &["fetch", "--prune", "origin"]).await?;
        let target = match &checkout.branch {
            Some(branch) => format!("origin/{branch}"),
            None => "origin/HEAD".to_string(),
        };
        self.git.run(dir, &["reset", "--hard", &target]).await?;
        self.git.run(dir, &["clean", "-fd"]).await?;
        Ok(())
    }

    async fn fresh_clone(&self, checkout: &Checkout) -> VcsResult<()> {
        prepare_fresh_checkout(checkout).await?;
        let path = checkout.path_arg();
        let mut args = vec!["clone"];
        if let Some(branch) = &checkout.branch {
            args.extend(["--branch", branch.as_str()]);
        }
        args.extend([checkout.url.as_str(), path.as_str()]);
        self.git.run(checkout.parent(), &args).await?;
        Ok(())
    }

    async fn head(&self, dir: &Path) -> VcsResult<RevisionId> {
        Ok(RevisionId::new(self.git.stdout(dir, &["rev-parse", "HEAD"]).await?))
    }
}

#[async_trait]
impl RepositoryClient for GitClient {
    fn kind(&self) -> VcsKind {
        VcsKind::Git
    }

    async fn pull(&self, checkout: &Checkout, since: Option<&RevisionId>) -> VcsResult<PullOutcome> {
        let existing = tokio::fs::try_exists(checkout.path.join(".git"))
            .await
            .unwrap_or(false);
        let updated = existing
            && match self.update(checkout).await {
                Ok(()) => true,
                Err(err) => {
                    warn!(url = %checkout.url, error = %err, "git update failed, cloning afresh");
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
                let range = format!("{since}..{revision}");
                let out = self
                    .git
                    .output(&checkout.path, &["diff", "--name-only", &range])
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
        let mut add = vec!["add", "--all", "--"];
        add.extend(names.iter().map(String::as_str));
        self.git.run(dir, &add).await?;

        let staged = self.git.output(dir, &["diff", "--cached", "--quiet"]).await?;
        if staged.success() {
            return Ok(CommitOutcome::NothingToCommit);
        }
        let (name, email) = split_author(author);
        let user_name = format!("user.name={name}");
        let user_email = format!("user.email={email}");
        self.git
            .run(
                dir,
                &["-c", &user_name, "-c", &user_email, "commit", "-m", message, "--author", author],
            )
            .await?;
        Ok(CommitOutcome::Committed(self.head(dir).await?))
    }

    async fn push(&self, checkout: &Checkout) -> VcsResult<()> {
        let refspec = match &checkout.branch {
            Some(branch) => format!("HEAD:{branch}"),
            None => "HEAD".to_string(),
        };
        self.git.run(&checkout.path, &["push", "origin", &refspec]).await?;
        Ok(())
    }

    async fn last_modified(&self, checkout: &Checkout, path: &Path) -> VcsResult<Option<DateTime<Utc>>> {
        let path = path.to_string_lossy();
        let args = ["log", "-1", "--format=%ct", "--", path.as_ref()];
        let out = self.git.stdout(&checkout.path, &args).await?;
        if out.is_empty() {
            return Ok(None);
        }
        let secs: i64 = out.parse().map_err(|_| self.git.unexpected(&args, &out))?;
        Ok(DateTime::from_timestamp(secs, 0))
    }
}
