//! `listen` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

use super::load_blueprint;
use crate::cli::ListenArgs;
use crate::pipeline::{Listener, ListenerConfig};

/// Execute the `listen` command
pub async fn run_listen(args: &ListenArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref host) = args.bind_host {
        info!(host = %host, "Overriding bind host from CLI");
        blueprint.transport.bind_host = host.clone();
    }

    info!(
        bind_host = %blueprint.transport.bind_host,
        log_port = blueprint.transport.log_port,
        critical_error_port = blueprint.transport.critical_error_port,
        channels = blueprint.channels.len(),
        "Configuration loaded"
    );

    // Initialize Metrics (optional)
    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
    }

    let listener = Listener::new(ListenerConfig {
        blueprint,
        channel: args.channel.clone(),
        max_events: (args.max_events != 0).then_some(args.max_events),
        timeout: (args.timeout != 0).then(|| Duration::from_secs(args.timeout)),
    });

    let stats = listener
        .run(shutdown_signal())
        .await
        .context("Listener failed")?;

    info!(
        events = stats.received.total_events,
        critical = stats.received.total_critical,
        duration_secs = stats.duration.as_secs_f64(),
        rate = format!("{:.2}", stats.events_per_sec()),
        "Listener finished"
    );
    stats.print_summary();
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
