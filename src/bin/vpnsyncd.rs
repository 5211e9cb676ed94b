//! VPN Profile Reconciliation Daemon (vpnsyncd)
//!
//! Loads the desired profiles from the configured directory, queues what
//! differs from the installed profiles, and applies the queue on a jittered
//! interval without touching connected profiles.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon
//! sudo vpnsyncd --config /etc/vpnsync/vpnsync.toml
//!
//! # Run a single reconciliation cycle and exit
//! sudo vpnsyncd --once --verbose
//! ```
//!
//! SIGHUP re-reads the desired profile directory.

use clap::Parser;
use libvpnsync::config::DEFAULT_CONFIG_PATH;
use libvpnsync::error::{VpnsyncError, VpnsyncResult};
use libvpnsync::{
    DirectoryProfileStore, FileConnectionMonitor, Orchestrator, VpnsyncConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// VPN Profile Reconciliation Daemon
#[derive(Parser, Debug)]
#[command(name = "vpnsyncd")]
#[command(version)]
#[command(about = "VPN profile reconciliation daemon", long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run one reconciliation cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> VpnsyncResult<()> {
    let args = Args::parse();
    init_logging(&args);

    info!("Starting VPN Profile Reconciliation Daemon (vpnsyncd)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match VpnsyncConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let store = Arc::new(DirectoryProfileStore::new(&config.paths.store_dir));
    let monitor = Arc::new(FileConnectionMonitor::new(&config.paths.connections_file));
    let orchestrator = Arc::new(
        Orchestrator::new(
            config.orchestrator_settings(),
            store,
            monitor,
            Arc::new(config.clone()),
            CancellationToken::new(),
        )
        .await,
    );

    sync_desired(&orchestrator, &config.profiles.desired_dir).await;

    if args.once {
        let report = orchestrator.handle_profile_updates().await;
        info!(
            "Single cycle finished: {} applied, {} failed, {} deferred",
            report.applied.len(),
            report.failed.len(),
            report.deferred.len()
        );
        return Ok(());
    }

    let signals = {
        let orchestrator = orchestrator.clone();
        let desired_dir = config.profiles.desired_dir.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_signals(orchestrator, desired_dir).await {
                error!("Signal handler error: {}", e);
            }
        })
    };

    info!("Managed profiles installed: {:?}", orchestrator.get_managed_profile_list().await);
    orchestrator.run().await;

    signals.abort();
    let pending = orchestrator.pending_updates().await;
    if pending > 0 {
        warn!("{} update(s) still pending at shutdown", pending);
    }
    info!("VPN Profile Reconciliation Daemon stopped");
    Ok(())
}

/// Initialize logging based on command-line arguments
fn init_logging(args: &Args) {
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::new(format!("vpnsyncd={},libvpnsync={}", log_level, log_level))
        });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(atty::is(atty::Stream::Stdout))
        .init();
}

/// Read every `*.xml` document in the desired profile directory
async fn load_desired_documents(dir: &Path) -> VpnsyncResult<Vec<String>> {
    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("xml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        documents.push(tokio::fs::read_to_string(&path).await?);
    }
    Ok(documents)
}

async fn sync_desired(orchestrator: &Orchestrator, dir: &Path) {
    let documents = match load_desired_documents(dir).await {
        Ok(documents) => documents,
        Err(e) => {
            warn!("Cannot read desired profiles from {:?}: {}", dir, e);
            return;
        }
    };

    match orchestrator.sync_desired_profiles(&documents).await {
        Ok(outcome) => {
            for (index, e) in &outcome.errors {
                error!("Desired profile #{} in {:?} is invalid: {}", index, dir, e);
            }
        }
        Err(e) => warn!("Desired state sync failed: {}", e),
    }
}

/// Handle Unix signals (SIGTERM, SIGINT, SIGHUP)
async fn handle_signals(orchestrator: Arc<Orchestrator>, desired_dir: PathBuf) -> VpnsyncResult<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| VpnsyncError::Config(format!("Failed to register SIGTERM handler: {}", e)))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| VpnsyncError::Config(format!("Failed to register SIGINT handler: {}", e)))?;
        let mut sighup = signal(SignalKind::hangup())
            .map_err(|e| VpnsyncError::Config(format!("Failed to register SIGHUP handler: {}", e)))?;

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, re-reading desired profiles");
                    sync_desired(&orchestrator, &desired_dir).await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = &desired_dir;
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| VpnsyncError::Config(format!("Failed to listen for Ctrl+C: {}", e)))?;
        info!("Received Ctrl+C, initiating graceful shutdown");
    }

    orchestrator.shutdown();
    Ok(())
}
