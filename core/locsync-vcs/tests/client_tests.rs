use async_trait::async_trait;
use locsync_vcs::{
    Checkout, CommandOutput, CommandRunner, CommitOutcome, GitClient, HgClient, RepositoryClient,
    RevisionId, SvnClient, SystemRunner, VcsError, VcsKind, VcsResult, client_for,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Answers commands by prefix match and records every invocation.
#[derive(Default)]
struct ScriptedRunner {
    rules: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    fn on(mut self, prefix: &str, output: CommandOutput) -> Self {
        self.rules.push((prefix.to_string(), output));
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn ran(&self, prefix: &str) -> bool {
        self.calls().iter().any(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[String], _cwd: &Path) -> VcsResult<CommandOutput> {
        let line = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());
        Ok(self
            .rules
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

fn checkout_in(dir: &Path, marker: Option<&str>) -> Checkout {
    let path = dir.join("repo");
    if let Some(marker) = marker {
        std::fs::create_dir_all(path.join(marker)).unwrap();
    }
    Checkout::new("https://example.com/l10n", path)
}

// ── Git ───────────────────────────────────────────────────────────

#[tokio::test]
async fn git_pull_updates_existing_checkout() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git")).with_branch("main");
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("git rev-parse HEAD", CommandOutput::ok("bbb\n"))
            .on("git diff --name-only aaa..bbb", CommandOutput::ok("en/app.po\nde/app.po\n")),
    );
    let client = GitClient::new(runner.clone());

    let outcome = client.pull(&checkout, Some(&RevisionId::new("aaa"))).await.unwrap();

    assert_eq!(outcome.revision, RevisionId::new("bbb"));
    assert!(!outcome.cloned);
    let expected: BTreeSet<PathBuf> = ["de/app.po", "en/app.po"].into_iter().map(PathBuf::from).collect();
    assert_eq!(outcome.changed_paths, Some(expected));
    assert!(runner.ran("git reset --hard origin/main"));
    assert!(!runner.ran("git clone"));
}

#[tokio::test]
async fn git_pull_at_same_revision_reports_no_changes() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git"));
    let runner = Arc::new(ScriptedRunner::default().on("git rev-parse HEAD", CommandOutput::ok("aaa")));
    let client = GitClient::new(runner.clone());

    let outcome = client.pull(&checkout, Some(&RevisionId::new("aaa"))).await.unwrap();

    assert_eq!(outcome.changed_paths, Some(BTreeSet::new()));
    assert!(!runner.ran("git diff --name-only"));
}

#[tokio::test]
async fn git_pull_falls_back_to_clone() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("git fetch", CommandOutput::failed(128, "fatal: corrupt pack"))
            .on("git rev-parse HEAD", CommandOutput::ok("ccc")),
    );
    let client = GitClient::new(runner.clone());

    let outcome = client.pull(&checkout, Some(&RevisionId::new("aaa"))).await.unwrap();

    assert!(outcome.cloned);
    assert_eq!(outcome.changed_paths, None);
    assert!(runner.ran("git clone https://example.com/l10n"));
    // The broken working copy was removed before cloning.
    assert!(!checkout.path.exists());
}

#[tokio::test]
async fn git_pull_without_checkout_clones() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), None).with_branch("l10n");
    let runner = Arc::new(ScriptedRunner::default().on("git rev-parse HEAD", CommandOutput::ok("ddd")));
    let client = GitClient::new(runner.clone());

    let outcome = client.pull(&checkout, None).await.unwrap();

    assert!(outcome.cloned);
    assert!(runner.ran("git clone --branch l10n"));
    assert!(!runner.ran("git fetch"));
}

#[tokio::test]
async fn git_clone_failure_is_repository_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), None);
    let runner = Arc::new(
        ScriptedRunner::default().on("git clone", CommandOutput::failed(128, "could not resolve host")),
    );
    let client = GitClient::new(runner);

    let err = client.pull(&checkout, None).await.unwrap_err();

    match err {
        VcsError::RepositoryUnavailable { url, detail } => {
            assert_eq!(url, "https://example.com/l10n");
            assert!(detail.contains("could not resolve host"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn git_commit_with_nothing_staged() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git"));
    let runner = Arc::new(ScriptedRunner::default().on("git diff --cached --quiet", CommandOutput::ok("")));
    let client = GitClient::new(runner.clone());

    let outcome = client
        .commit(&checkout, &[PathBuf::from("de/app.po")], "Sync", "Bot <bot@example.com>")
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert!(runner.ran("git add --all -- de/app.po"));
    assert!(!runner.ran("git -c"));
}

#[tokio::test]
async fn git_commit_sets_author() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("git diff --cached --quiet", CommandOutput::failed(1, ""))
            .on("git rev-parse HEAD", CommandOutput::ok("eee")),
    );
    let client = GitClient::new(runner.clone());

    let outcome = client
        .commit(&checkout, &[PathBuf::from("de/app.po")], "Sync", "Bot <bot@example.com>")
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::Committed(RevisionId::new("eee")));
    assert!(runner.ran("git -c user.name=Bot -c user.email=bot@example.com commit -m Sync --author Bot <bot@example.com>"));
}

#[tokio::test]
async fn git_push_failure_is_command_failed() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git")).with_branch("main");
    let runner = Arc::new(ScriptedRunner::default().on("git push", CommandOutput::failed(1, "rejected")));
    let client = GitClient::new(runner.clone());

    let err = client.push(&checkout).await.unwrap_err();

    assert!(matches!(err, VcsError::CommandFailed { status: Some(1), .. }));
    assert!(runner.ran("git push origin HEAD:main"));
}

#[tokio::test]
async fn git_last_modified_parses_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".git"));
    let runner = Arc::new(ScriptedRunner::default().on("git log -1", CommandOutput::ok("1700000000\n")));
    let client = GitClient::new(runner);

    let when = client.last_modified(&checkout, Path::new("de/app.po")).await.unwrap();

    assert_eq!(when.map(|d| d.timestamp()), Some(1_700_000_000));
}

// ── Mercurial ─────────────────────────────────────────────────────

#[tokio::test]
async fn hg_pull_lists_changed_files() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".hg"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("hg log -r .", CommandOutput::ok("f00d"))
            .on("hg status --rev abc", CommandOutput::ok("fr/app.ftl\n")),
    );
    let client = HgClient::new(runner.clone());

    let outcome = client.pull(&checkout, Some(&RevisionId::new("abc"))).await.unwrap();

    assert_eq!(outcome.revision.as_str(), "f00d");
    assert_eq!(outcome.changed_paths, Some(BTreeSet::from([PathBuf::from("fr/app.ftl")])));
    assert!(runner.ran("hg update --clean -r tip"));
}

#[tokio::test]
async fn hg_commit_exit_one_is_nothing_to_commit() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".hg"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("hg add", CommandOutput::failed(1, "already tracked"))
            .on("hg commit", CommandOutput::failed(1, "nothing changed")),
    );
    let client = HgClient::new(runner);

    let outcome = client
        .commit(&checkout, &[PathBuf::from("fr/app.ftl")], "Sync", "Bot <bot@example.com>")
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::NothingToCommit);
}

#[tokio::test]
async fn hg_push_with_nothing_outgoing_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".hg"));
    let runner = Arc::new(ScriptedRunner::default().on("hg push", CommandOutput::failed(1, "no changes found")));
    let client = HgClient::new(runner);

    client.push(&checkout).await.unwrap();
}

#[tokio::test]
async fn hg_push_error_propagates() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".hg"));
    let runner = Arc::new(ScriptedRunner::default().on("hg push", CommandOutput::failed(255, "abort: push creates new remote head")));
    let client = HgClient::new(runner);

    assert!(client.push(&checkout).await.is_err());
}

#[tokio::test]
async fn hg_last_modified_reads_hgdate() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".hg"));
    let runner = Arc::new(ScriptedRunner::default().on("hg log -l 1", CommandOutput::ok("1600000000 -7200")));
    let client = HgClient::new(runner);

    let when = client.last_modified(&checkout, Path::new("fr/app.ftl")).await.unwrap();

    assert_eq!(when.map(|d| d.timestamp()), Some(1_600_000_000));
}

// ── Subversion ────────────────────────────────────────────────────

#[tokio::test]
async fn svn_pull_summarizes_range() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".svn"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("svn info --show-item revision", CommandOutput::ok("42\n"))
            .on("svn diff --summarize -r 40:42", CommandOutput::ok("M       ja/app.properties\nA       ja/new.properties\n")),
    );
    let client = SvnClient::new(runner.clone());

    let outcome = client.pull(&checkout, Some(&RevisionId::new("40"))).await.unwrap();

    let expected: BTreeSet<PathBuf> = ["ja/app.properties", "ja/new.properties"].into_iter().map(PathBuf::from).collect();
    assert_eq!(outcome.changed_paths, Some(expected));
    assert!(runner.ran("svn revert -R ."));
}

#[tokio::test]
async fn svn_commit_skips_clean_files() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".svn"));
    let runner = Arc::new(ScriptedRunner::default().on("svn status -q", CommandOutput::ok("")));
    let client = SvnClient::new(runner.clone());

    let outcome = client
        .commit(&checkout, &[PathBuf::from("ja/app.properties")], "Sync", "Bot <bot@example.com>")
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::NothingToCommit);
    assert!(!runner.ran("svn commit"));
}

#[tokio::test]
async fn svn_push_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".svn"));
    let runner = Arc::new(ScriptedRunner::default());
    let client = SvnClient::new(runner.clone());

    client.push(&checkout).await.unwrap();

    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn svn_last_modified_parses_rfc3339() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".svn"));
    let runner = Arc::new(
        ScriptedRunner::default()
            .on("svn info --show-item last-changed-date", CommandOutput::ok("2024-05-01T10:00:00.000000Z\n")),
    );
    let client = SvnClient::new(runner);

    let when = client.last_modified(&checkout, Path::new("ja/app.properties")).await.unwrap().unwrap();

    assert_eq!(when.to_rfc3339(), "2024-05-01T10:00:00+00:00");
}

#[tokio::test]
async fn svn_last_modified_garbage_is_unexpected_output() {
    let dir = tempfile::tempdir().unwrap();
    let checkout = checkout_in(dir.path(), Some(".svn"));
    let runner = Arc::new(
        ScriptedRunner::default().on("svn info --show-item last-changed-date", CommandOutput::ok("yesterday")),
    );
    let client = SvnClient::new(runner);

    let err = client.last_modified(&checkout, Path::new("x")).await.unwrap_err();

    assert!(matches!(err, VcsError::UnexpectedOutput { .. }));
}

// ── Factory and real git ──────────────────────────────────────────

#[test]
fn client_for_matches_kind() {
    let runner: Arc<dyn CommandRunner> = Arc::new(ScriptedRunner::default());
    for kind in [VcsKind::Git, VcsKind::Hg, VcsKind::Svn] {
        assert_eq!(client_for(kind, runner.clone()).kind(), kind);
    }
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Test")
        .env("GIT_AUTHOR_EMAIL", "test@example.com")
        .env("GIT_COMMITTER_NAME", "Test")
        .env("GIT_COMMITTER_EMAIL", "test@example.com")
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

#[tokio::test]
async fn real_git_clone_commit_and_push() {
    if !git_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let origin = dir.path().join("origin.git");
    let seed = dir.path().join("seed");
    std::fs::create_dir_all(&origin).unwrap();
    git(&origin, &["init", "--bare", "-b", "main"]);
    git(dir.path(), &["clone", origin.to_str().unwrap(), "seed"]);
    std::fs::write(seed.join("app.po"), "msgid \"a\"\nmsgstr \"\"\n").unwrap();
    git(&seed, &["add", "."]);
    git(&seed, &["commit", "-m", "seed"]);
    git(&seed, &["push", "origin", "HEAD:main"]);

    let client = GitClient::new(Arc::new(SystemRunner));
    let checkout = Checkout::new(origin.to_string_lossy(), dir.path().join("work")).with_branch("main");

    let first = client.pull(&checkout, None).await.unwrap();
    assert!(first.cloned);

    std::fs::write(checkout.path.join("app.po"), "msgid \"a\"\nmsgstr \"A\"\n").unwrap();
    let committed = client
        .commit(&checkout, &[PathBuf::from("app.po")], "Update", "Bot <bot@example.com>")
        .await
        .unwrap();
    let CommitOutcome::Committed(rev) = committed else {
        panic!("expected a commit");
    };
    client.push(&checkout).await.unwrap();

    let again = client.pull(&checkout, Some(&first.revision)).await.unwrap();
    assert!(!again.cloned);
    assert_eq!(again.revision, rev);
    assert_eq!(again.changed_paths, Some(BTreeSet::from([PathBuf::from("app.po")])));
    assert!(client.last_modified(&checkout, Path::new("app.po")).await.unwrap().is_some());
}
