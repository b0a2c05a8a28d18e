//! Listener - runs the log and critical-error pumps and dispatches through a router.
//!
//! ```text
//! log port      ─▶ ReceivePump<LogEvent>      ─▶ Router::dispatch(channel) ─┐
//! critical port ─▶ ReceivePump<CriticalError> ─▶ error! ────────────────────┴─▶ stats
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{
    ChannelConfig, CriticalError, HandlerConfig, LeafConfig, LogEvent, PipelineBlueprint,
    RecordCodec, TransportSettings,
};
use dispatcher::Router;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use transport::{CallbackError, CriticalErrorCodec, LogEventCodec, PumpConfig, ReceivePump};

use super::ListenStats;
use crate::error::CliError;

/// Listener configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Resolved pipeline blueprint
    pub blueprint: PipelineBlueprint,

    /// Channel every received record is dispatched to
    pub channel: String,

    /// Stop after this many records (None = unlimited)
    pub max_events: Option<u64>,

    /// Stop after this long (None = no timeout)
    pub timeout: Option<Duration>,
}

/// Outcome of one received record, reported to the main loop
enum Received {
    Log { event: LogEvent, delivered: bool },
    Critical(CriticalError),
}

/// Receive-side orchestrator
pub struct Listener {
    config: ListenerConfig,
}

impl Listener {
    pub fn new(config: ListenerConfig) -> Self {
        Self { config }
    }

    /// Channels to serve: the configured ones, or a single console channel
    fn channels(&self) -> Vec<ChannelConfig> {
        if self.config.blueprint.channels.is_empty() {
            vec![ChannelConfig {
                name: self.config.channel.clone(),
                root: HandlerConfig::Leaf(LeafConfig::new("console", "log")),
            }]
        } else {
            self.config.blueprint.channels.clone()
        }
    }

    /// Run until `shutdown` resolves, the timeout expires or `max_events` is reached
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<ListenStats> {
        let start_time = Instant::now();
        let transport = &self.config.blueprint.transport;

        let router = Arc::new(
            Router::with_channels(&self.channels())
                .await
                .context("Failed to build channels")?,
        );
        if router.channel(&self.config.channel).await.is_none() {
            let available = router.channel_names().await;
            router.shutdown().await;
            return Err(CliError::channel_not_configured(&self.config.channel, &available).into());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut log_pump = bind_pump(transport, transport.log_port, LogEventCodec::default()).await?;
        let mut critical_pump = bind_pump(
            transport,
            transport.critical_error_port,
            CriticalErrorCodec::default(),
        )
        .await?;

        {
            let router = Arc::clone(&router);
            let channel = self.config.channel.clone();
            let tx = tx.clone();
            log_pump.start_async(move |event: LogEvent| {
                let router = Arc::clone(&router);
                let channel = channel.clone();
                let tx = tx.clone();
                async move {
                    let delivered = router.dispatch(&channel, &event).await?;
                    tx.send(Received::Log { event, delivered })
                        .map_err(|_| "listener closed")?;
                    Ok::<(), CallbackError>(())
                }
            })?;
        }
        critical_pump.start(move |critical: CriticalError| {
            tx.send(Received::Critical(critical))
                .map_err(|_| "listener closed")?;
            Ok(())
        })?;

        info!(
            log = %log_pump.local_addr(),
            critical = %critical_pump.local_addr(),
            channel = %self.config.channel,
            "Listening"
        );

        let mut stats = ListenStats {
            channel: self.config.channel.clone(),
            ..Default::default()
        };

        let timeout = self.config.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(shutdown);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping listener...");
                    break;
                }
                _ = &mut deadline => {
                    info!("Listen timeout reached");
                    break;
                }
                received = rx.recv() => match received {
                    Some(Received::Log { event, delivered }) => {
                        stats.received.update(&event);
                        if delivered {
                            stats.events_delivered += 1;
                        } else {
                            stats.events_filtered += 1;
                        }
                        if self
                            .config
                            .max_events
                            .is_some_and(|max| stats.received.total_events >= max)
                        {
                            info!(events = stats.received.total_events, "Event limit reached");
                            break;
                        }
                    }
                    Some(Received::Critical(critical)) => {
                        error!(
                            monitor = ?critical.monitor_id,
                            raised_at = %critical.raised_at,
                            message = %critical.message,
                            "Critical error reported"
                        );
                        stats.received.record_critical();
                    }
                    None => break,
                }
            }
        }

        // Stop reception first, then retire the handler trees
        log_pump.stop()?;
        critical_pump.stop()?;
        log_pump.dispose().await;
        critical_pump.dispose().await;

        if let Some(channel) = router.channel(&self.config.channel).await {
            for (handler, snapshot) in channel.metrics() {
                info!(
                    handler = %handler,
                    handled = snapshot.handled_count,
                    failed = snapshot.failure_count,
                    filtered = snapshot.filtered_count,
                    "Handler metrics"
                );
            }
        }
        router.shutdown().await;

        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}

async fn bind_pump<C: RecordCodec>(
    transport: &TransportSettings,
    port: u16,
    codec: C,
) -> Result<ReceivePump<C>> {
    let config = PumpConfig::from_settings(transport, port)?;
    let addr = config.bind_addr;
    ReceivePump::bind(config, codec)
        .await
        .with_context(|| format!("Failed to bind receive pump on {addr}"))
}
