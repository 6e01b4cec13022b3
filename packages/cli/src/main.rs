#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mirrors a local site directory into a Cloudflare R2 bucket.
//!
//! `site_sync sync` (the default) uploads new and changed files and deletes
//! remote objects that no longer exist locally. `site_sync push` uploads
//! the named files unconditionally.
//!
//! Uses `indicatif-log-bridge` (via [`site_sync_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and the progress bar never fight for the terminal.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use site_sync::{DEFAULT_CONCURRENCY, DecisionSink, LogSink, Scope, SyncEngine, SyncError, SyncStats};
use site_sync_cli_utils::{TerminalReporter, render_summary};
use site_sync_r2::{OperationAccountant, R2Client, R2Config, Remote};

/// Exit code for a run interrupted with Ctrl-C.
const INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "site_sync", about = "Mirror a local site directory into an R2 bucket")]
struct Cli {
    /// Local directory to mirror
    #[arg(long, global = true, env = "SITE_SYNC_ROOT", default_value = "www")]
    root: PathBuf,

    /// Destination bucket
    #[arg(long, global = true, env = "R2_BUCKET", default_value = "www")]
    bucket: String,

    /// Number of files reconciled concurrently
    #[arg(long, global = true, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    /// Directory holding `account_id`, `access_key_id` and `access_key`
    /// files, used when the environment lacks credentials
    #[arg(long, global = true, default_value = ".secrets")]
    secrets_dir: PathBuf,

    /// Log one JSON record per decision instead of drawing progress
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Upload new and changed files, then delete remote orphans
    Sync {
        /// Leave `.jpg` and `.avif` thumbnails alone on both sides
        #[arg(long, conflicts_with = "index_only")]
        skip_thumbs: bool,

        /// Only reconcile `index.html`
        #[arg(long)]
        index_only: bool,
    },
    /// Upload the named files unconditionally
    Push {
        /// File names relative to the root
        #[arg(required = true)]
        names: Vec<String>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Self::Sync {
            skip_thumbs: false,
            index_only: false,
        }
    }
}

const fn scope(skip_thumbs: bool, index_only: bool) -> Scope {
    if index_only {
        Scope::IndexOnly
    } else if skip_thumbs {
        Scope::SkipThumbs
    } else {
        Scope::All
    }
}

async fn run(
    engine: &SyncEngine,
    command: Commands,
    sink: &dyn DecisionSink,
) -> Result<SyncStats, SyncError> {
    match command {
        Commands::Sync {
            skip_thumbs,
            index_only,
        } => {
            let report = engine.sync(scope(skip_thumbs, index_only), sink).await?;
            if report.has_failures() {
                log::warn!("Some files failed; they will be retried on the next run");
            }
            Ok(report.stats())
        }
        Commands::Push { names } => {
            let outcomes = engine.push(&names, sink).await;
            Ok(SyncStats::from_outcomes(&outcomes))
        }
    }
}

/// Resolves once `signal` reports an interrupt. If the handler cannot be
/// installed the run continues without interrupt handling.
async fn interrupted(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        log::warn!("Cannot listen for Ctrl-C, continuing without it: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = site_sync_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = R2Config::from_env(&cli.bucket, &cli.secrets_dir)?;
    log::debug!("Using {config:?}");

    let accountant = Arc::new(OperationAccountant::new());
    let remote = Remote::new(Arc::new(R2Client::new(&config)), Arc::clone(&accountant))
        .with_timeout(Duration::from_secs(cli.timeout_secs));
    let engine = SyncEngine::new(remote, &cli.root).with_concurrency(cli.concurrency);

    let terminal = (!cli.plain).then(|| TerminalReporter::new(&multi));
    let sink: &dyn DecisionSink = match &terminal {
        Some(reporter) => reporter,
        None => &LogSink,
    };

    let command = cli.command.unwrap_or_default();
    let result = tokio::select! {
        result = run(&engine, command, sink) => Some(result),
        () = interrupted(tokio::signal::ctrl_c()) => None,
    };

    if let Some(reporter) = &terminal {
        reporter.finish();
    }

    println!("{}", render_summary(&accountant.summary()));

    match result {
        Some(Ok(stats)) => {
            println!("{stats}");
            Ok(())
        }
        Some(Err(e)) => Err(e.into()),
        None => {
            log::warn!("Interrupted; uploads already finished are kept");
            std::process::exit(INTERRUPTED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_full_sync() {
        let cli = Cli::try_parse_from(["site_sync"]).unwrap();

        assert_eq!(cli.root, PathBuf::from("www"));
        assert_eq!(cli.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(cli.timeout_secs, 30);
        assert!(!cli.plain);
        assert_eq!(cli.command.unwrap_or_default(), Commands::default());
    }

    #[test]
    fn parses_sync_scopes() {
        let cli = Cli::try_parse_from(["site_sync", "sync", "--skip-thumbs"]).unwrap();
        let Some(Commands::Sync {
            skip_thumbs,
            index_only,
        }) = cli.command
        else {
            panic!("expected sync");
        };

        assert_eq!(scope(skip_thumbs, index_only), Scope::SkipThumbs);
        assert_eq!(scope(false, true), Scope::IndexOnly);
        assert_eq!(scope(false, false), Scope::All);
    }

    #[test]
    fn rejects_conflicting_scopes() {
        assert!(Cli::try_parse_from(["site_sync", "sync", "--skip-thumbs", "--index-only"]).is_err());
    }

    #[tokio::test]
    async fn signal_install_failure_never_interrupts() {
        let failed = interrupted(async { Err(std::io::Error::other("no signal handler")) });

        assert!(
            tokio::time::timeout(Duration::from_millis(50), failed)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn delivered_signal_interrupts() {
        tokio::time::timeout(Duration::from_secs(1), interrupted(async { Ok(()) }))
            .await
            .unwrap();
    }

    #[test]
    fn push_requires_names() {
        assert!(Cli::try_parse_from(["site_sync", "push"]).is_err());

        let cli = Cli::try_parse_from(["site_sync", "--plain", "push", "a.html", "b.css"]).unwrap();
        assert!(cli.plain);
        assert_eq!(
            cli.command,
            Some(Commands::Push {
                names: vec!["a.html".to_string(), "b.css".to_string()],
            })
        );
    }
}
