//! `send` command implementation.

use anyhow::{Context, Result};
use contracts::LogEvent;
use tracing::info;
use transport::{CriticalErrorSender, LogSender};

use super::load_blueprint;
use crate::cli::SendArgs;

/// Execute the `send` command
pub async fn run_send(args: &SendArgs) -> Result<()> {
    let mut blueprint = load_blueprint(args.config.as_deref())?;

    // Apply CLI overrides
    if let Some(ref destination) = args.destination {
        info!(destination = %destination, "Overriding destination host from CLI");
        blueprint.transport.destination_host = destination.clone();
    }
    config_loader::ConfigLoader::validate(&blueprint).context("Invalid transport settings")?;

    let transport = &blueprint.transport;
    let mut fragments = 0;

    if args.critical {
        let mut sender = CriticalErrorSender::from_settings(transport)
            .await
            .context("Failed to create critical-error sender")?;
        for _ in 0..args.repeat {
            fragments += sender
                .report(Some(args.monitor.clone()), args.message.as_str())
                .await
                .context("Failed to send critical error")?;
        }
        sender.close();
    } else {
        let mut sender = LogSender::from_settings(transport)
            .await
            .context("Failed to create log sender")?;
        let event = LogEvent::new(&args.monitor, args.level, args.message.clone());
        for _ in 0..args.repeat {
            fragments += sender
                .send_event(&event)
                .await
                .context("Failed to send log record")?;
        }
        sender.close();
    }

    let port = if args.critical {
        transport.critical_error_port
    } else {
        transport.log_port
    };
    info!(
        destination = %transport.destination_host,
        port,
        records = args.repeat,
        fragments,
        "Records sent"
    );
    Ok(())
}
