//! `send` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use crate::cli::SendArgs;
use crate::error::CliError;
use crate::session::{ExportSession, SessionConfig};

/// Execute the `send` command
pub async fn run_send(args: &SendArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let settings = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize Metrics (optional)
    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let session = ExportSession::new(SessionConfig {
        settings,
        channel: args.channel.into(),
        inputs: args.inputs.clone(),
        transport: args.transport,
        output: args.output.clone(),
        serialized: args.serialized,
        repeat: args.repeat,
        timeout_ms: args.timeout_ms,
        drain: Duration::from_millis(args.drain_ms),
    });

    let shutdown_signal = setup_shutdown_signal();
    let task = tokio::task::spawn_blocking(move || session.run());

    tokio::select! {
        joined = task => {
            let stats = joined
                .context("Export session panicked")?
                .context("Export session failed")?;
            info!(
                succeeded = stats.results.succeeded,
                total = stats.results.total,
                duration_secs = stats.duration.as_secs_f64(),
                "Export session completed"
            );
            stats.print_summary();
            if !stats.all_succeeded() {
                warn!("Some exports did not succeed");
            }
        }
        _ = shutdown_signal => {
            warn!("Received shutdown signal, abandoning session...");
        }
    }

    Ok(())
}

/// Setup Ctrl+C and SIGTERM signal handlers
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
