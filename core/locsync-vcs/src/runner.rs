//! Subprocess execution.
//!
//! Repository clients never spawn processes directly; they go through a
//! [`CommandRunner`] so that tests can script VCS behaviour.

use crate::error::{VcsError, VcsResult};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful run printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed run with the given exit code and error text.
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Success is decided by the exit code alone.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Converts a non-zero exit into [`VcsError::CommandFailed`].
    pub fn check(self, program: &str, args: &[String]) -> VcsResult<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(VcsError::CommandFailed {
                command: display_command(program, args),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

pub(crate) fn display_command(program: &str, args: &[String]) -> String {
    let mut out = program.to_string();
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args` in `cwd` and captures its output.
    ///
    /// Only a failure to start the process is an error; a non-zero exit
    /// is reported through [`CommandOutput::status`].
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> VcsResult<CommandOutput>;
}

/// Runs commands with `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> VcsResult<CommandOutput> {
        debug!(command = %display_command(program, args), cwd = %cwd.display(), "running");
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("HGPLAIN", "1")
            .env("LC_ALL", "C")
            .kill_on_drop(true)
            .output()
            .await?;
        let output = CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        if !output.success() {
            debug!(status = ?output.status, stderr = %output.stderr.trim(), "command failed");
        }
        Ok(output)
    }
}
