//! locsync sync worker
//!
//! Runs repository/database syncs for the projects listed in a JSON
//! configuration file.
//!
//! Usage:
//!   locsync-worker --config locsync.json sync firefox thunderbird
//!   locsync-worker sync --all
//!   locsync-worker status firefox
//!   locsync-worker tm de "Open a new window"

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use locsync_worker::{Worker, WorkerConfig};
use std::path::PathBuf;
use tracing::{Level, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "locsync-worker")]
#[command(about = "Sync localization repositories with the translation database")]
struct Args {
    /// Path to the worker configuration file
    #[arg(short, long, default_value = "locsync.json")]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sync projects now and wait for the runs to finish
    Sync {
        /// Project slugs
        #[arg(required_unless_present = "all")]
        projects: Vec<String>,

        /// Sync every configured project
        #[arg(long, conflicts_with = "projects")]
        all: bool,
    },
    /// Print a project's latest run as JSON
    Status { project: String },
    /// Search translation memory
    Tm {
        locale: String,
        text: String,

        /// Minimum match quality, 0 to 100
        #[arg(long, default_value_t = 50)]
        min_quality: u8,

        #[arg(short = 'n', long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = WorkerConfig::load(&args.config)?;
    let worker = Worker::open(config)?;

    match args.command {
        Command::Sync { projects, all } => {
            let projects = if all { worker.all_projects() } else { projects };
            if projects.is_empty() {
                bail!("No projects configured");
            }

            let shutdown = worker.orchestrator().cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, stopping runs at the next stage");
                    shutdown.cancel();
                }
            });

            let outcomes = worker.sync(&projects).await?;
            let mut failed = 0;
            for outcome in &outcomes {
                match &outcome.result {
                    Ok(run) => {
                        println!("{}: {}", outcome.project, run.status);
                        print!("{}", run.summary.render());
                    }
                    Err(e) => {
                        failed += 1;
                        println!("{}: failed: {e}", outcome.project);
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} syncs failed", outcomes.len());
            }
            info!(projects = outcomes.len(), "all syncs finished");
        }
        Command::Status { project } => {
            let report = worker.status(&project)?;
            let json = serde_json::to_string_pretty(&report).context("Failed to encode status")?;
            println!("{json}");
        }
        Command::Tm {
            locale,
            text,
            min_quality,
            limit,
        } => {
            let matches = worker.suggest(&locale, &text, min_quality, limit)?;
            if matches.is_empty() {
                println!("No matches");
            }
            for m in matches {
                println!("{:>3}%  {}  =>  {}", m.quality, m.entry.source, m.entry.target);
            }
        }
    }
    Ok(())
}
