//! CLI entry point for snapfeed.
//!
//! This binary finds the newest completed snapshot in time-partitioned
//! hierarchies (`<root>/<year>/<month>/<day>/<hour>/<millis>.<ext>`) and
//! keeps subscribers supplied with the latest one as producers write more.
//!
//! # Usage
//!
//! ```bash
//! snapfeed [OPTIONS] <COMMAND>
//!
//! # Print the newest snapshot path once
//! snapfeed latest --root /data/daq
//!
//! # Run discovery and mirror each source's newest snapshot into a directory
//! snapfeed serve --config snapfeed.json --mirror /var/lib/snapfeed
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod driver;
mod mirror;
mod sources;

use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{WrapErr, eyre};
use snapfeed_core::{Config, SourceRegistry};
use snapfeed_discovery::{HierarchyWalker, NameOrdering, PollingDiscovery, TEMP_SUFFIX};
use snapfeed_fanout::FanoutEngine;
use snapfeed_watcher::WatchingDiscovery;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::driver::run_discovery_loop;
use crate::mirror::MirrorConnection;
use crate::sources::ConfigFileSources;

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Latest-snapshot discovery and delivery for time-partitioned hierarchies.
#[derive(Parser)]
#[command(name = "snapfeed", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the newest completed snapshot under a hierarchy root.
    Latest {
        /// Hierarchy root directory.
        #[arg(short, long)]
        root: Utf8PathBuf,

        /// Suffix producers use for files still being written.
        #[arg(long, default_value = TEMP_SUFFIX)]
        temp_suffix: String,
    },

    /// Run discovery and deliver new snapshots until interrupted.
    Serve {
        /// Service configuration file. Re-read every cycle for source changes.
        #[arg(short, long, env = "SNAPFEED_CONFIG")]
        config: Utf8PathBuf,

        /// Directory to mirror each followed source's newest snapshot into.
        #[arg(short, long)]
        mirror: Option<Utf8PathBuf>,

        /// Source to mirror (repeatable). Defaults to every configured source.
        #[arg(long = "follow", value_name = "SOURCE", requires = "mirror")]
        follow: Vec<String>,
    },
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Noisy crates like `mio` and `notify` are filtered to `warn` level.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},mio=warn,notify=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_ansi(use_ansi))
        .with(filter)
        .init();
}

/// Waits for Ctrl-C, or SIGTERM on Unix.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
async fn wait_for_shutdown() -> color_eyre::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl-C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl-C, shutting down");
    }

    Ok(())
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Prints the newest completed snapshot under `root`.
///
/// # Errors
///
/// Returns an error if a level cannot be listed, holds a malformed name, or
/// no completed snapshot exists.
fn run_latest(root: &Utf8Path, temp_suffix: &str) -> color_eyre::Result<()> {
    let walker = HierarchyWalker::new(NameOrdering::new(temp_suffix));
    let leaf = walker
        .try_walk(root)?
        .ok_or_else(|| eyre!("no completed snapshot under {root}"))?;

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{leaf}")?;
    Ok(())
}

/// Runs discovery and fan-out until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the mirror directory
/// cannot be created, or a followed source is not configured.
async fn run_serve(
    config_path: Utf8PathBuf,
    mirror: Option<Utf8PathBuf>,
    follow: Vec<String>,
) -> color_eyre::Result<()> {
    let config = Config::from_json_file(&config_path)
        .wrap_err_with(|| format!("failed to load configuration from {config_path}"))?;
    info!(
        config = %config_path,
        sources = config.sources.len(),
        strategy = ?config.discovery.strategy,
        "Starting snapfeed"
    );

    let registry: Arc<dyn SourceRegistry> = Arc::new(ConfigFileSources::new(
        config_path,
        config.tracked_sources(),
    ));

    let engine: FanoutEngine<MirrorConnection> = FanoutEngine::new(config.fanout);
    engine.start();
    engine.attach_registry(Arc::clone(&registry));

    if let Some(dir) = mirror {
        tokio::fs::create_dir_all(&dir)
            .await
            .wrap_err_with(|| format!("failed to create mirror directory {dir}"))?;
        let names = if follow.is_empty() {
            config.sources.iter().map(|source| source.name.clone()).collect()
        } else {
            follow
        };
        for name in names {
            let connection = MirrorConnection::new(&dir, name.trim());
            let target = connection.target().to_owned();
            let id = engine
                .open(&name, connection)
                .wrap_err_with(|| format!("cannot follow source '{name}'"))?;
            info!(source = %name, subscriber = %id, mirror = %target, "Mirroring source");
        }
    }

    let cancel = CancellationToken::new();
    let ordering = NameOrdering::new(config.discovery.temp_suffix.clone());
    let mut loops: Vec<JoinHandle<()>> = Vec::with_capacity(2);

    if config.discovery.strategy.runs_polling() {
        loops.push(tokio::spawn(run_discovery_loop(
            PollingDiscovery::new(ordering.clone()),
            config.discovery.poll_interval(),
            Arc::clone(&registry),
            engine.clone(),
            cancel.clone(),
        )));
    }
    if config.discovery.strategy.runs_watching() {
        loops.push(tokio::spawn(run_discovery_loop(
            WatchingDiscovery::new(ordering, config.discovery.watch_backend),
            config.discovery.watch_interval(),
            Arc::clone(&registry),
            engine.clone(),
            cancel.clone(),
        )));
    }

    let signal = wait_for_shutdown().await;

    cancel.cancel();
    for handle in loops {
        if let Err(error) = handle.await {
            warn!(error = %error, "Discovery loop ended abnormally");
        }
    }

    let undelivered = engine.shutdown().await;
    info!(
        delivered = engine.delivered_count(),
        failed = engine.failed_count(),
        undelivered,
        "Shutdown complete"
    );

    signal
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    match cli.command {
        Commands::Latest { root, temp_suffix } => run_latest(&root, &temp_suffix),
        Commands::Serve {
            config,
            mirror,
            follow,
        } => run_serve(config, mirror, follow).await,
    }
}
