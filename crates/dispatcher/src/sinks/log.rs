//! LogSink - logs event summary via tracing

use async_trait::async_trait;
use contracts::{ContractError, Handler, LeafConfig, LogEvent, LogLevel};
use tracing::{info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    minimal_filter: Option<LogLevel>,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            minimal_filter: None,
        }
    }

    /// Create from leaf configuration (for registry)
    pub fn from_config(config: &LeafConfig) -> Self {
        Self {
            name: config.name.clone(),
            minimal_filter: config.minimal_filter,
        }
    }

    fn log_event_summary(&self, event: &LogEvent) {
        info!(
            sink = %self.name,
            monitor = %event.monitor_id,
            level = %event.level,
            log_time = %event.log_time,
            payload_len = event.payload.len(),
            message = event.payload_text().unwrap_or("<binary>"),
            "LogEvent received"
        );
    }
}

#[async_trait]
impl Handler for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimal_filter(&self) -> Option<LogLevel> {
        self.minimal_filter
    }

    #[instrument(
        name = "log_sink_handle",
        skip(self, event),
        fields(sink = %self.name, monitor = %event.monitor_id)
    )]
    async fn handle(&self, event: &LogEvent, _parallel: bool) -> Result<(), ContractError> {
        self.log_event_summary(event);
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}
