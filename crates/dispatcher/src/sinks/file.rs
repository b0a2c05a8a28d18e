//! FileSink - appends events to a JSON lines file

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use contracts::{ChannelOptions, ContractError, Handler, LeafConfig, LogEvent, LogLevel};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument};

/// Configuration for FileSink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    /// Output file (parent directories are created)
    pub path: PathBuf,
    /// Flush after every event instead of on close
    pub auto_flush: bool,
}

impl FileSinkConfig {
    /// Create config from params map
    pub fn from_params(name: &str, params: &HashMap<String, String>) -> Self {
        let path = params
            .get("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(format!("./logs/{name}.jsonl")));
        let auto_flush = params
            .get("auto_flush")
            .is_some_and(|v| matches!(v.as_str(), "true" | "1" | "yes"));

        Self { path, auto_flush }
    }
}

/// One line of the output file
#[derive(Serialize)]
struct FileLine<'a> {
    monitor_id: &'a str,
    log_time: DateTime<Utc>,
    level: LogLevel,
    payload: String,
}

impl<'a> From<&'a LogEvent> for FileLine<'a> {
    fn from(event: &'a LogEvent) -> Self {
        Self {
            monitor_id: &event.monitor_id,
            log_time: event.log_time,
            level: event.level,
            payload: String::from_utf8_lossy(&event.payload).into_owned(),
        }
    }
}

/// Sink that appends events to a file
///
/// The file is opened by `initialize` and flushed by `close`. Writes are serialized by an
/// internal lock, so sibling handlers in a parallel node can share the same event safely.
pub struct FileSink {
    name: String,
    config: FileSinkConfig,
    minimal_filter: Option<LogLevel>,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl FileSink {
    /// Create a new FileSink (nothing is opened yet)
    pub fn new(name: impl Into<String>, config: FileSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            minimal_filter: None,
            writer: Mutex::new(None),
        }
    }

    /// Create from leaf configuration (for registry)
    pub fn from_config(config: &LeafConfig) -> Self {
        let mut sink = Self::new(
            &config.name,
            FileSinkConfig::from_params(&config.name, &config.params),
        );
        sink.minimal_filter = config.minimal_filter;
        sink
    }

    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }

    fn open_file(&self) -> std::io::Result<BufWriter<File>> {
        if let Some(parent) = self.config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        Ok(BufWriter::new(file))
    }

    fn write_line(&self, writer: &mut BufWriter<File>, event: &LogEvent) -> std::io::Result<()> {
        serde_json::to_writer(&mut *writer, &FileLine::from(event))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writer.write_all(b"\n")?;
        if self.config.auto_flush {
            writer.flush()?;
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimal_filter(&self) -> Option<LogLevel> {
        self.minimal_filter
    }

    #[instrument(name = "file_sink_initialize", skip(self, options), fields(sink = %self.name))]
    async fn initialize(&self, options: &ChannelOptions) -> Result<(), ContractError> {
        let writer = self
            .open_file()
            .map_err(|e| ContractError::handler_init(&self.name, e.to_string()))?;
        *self.writer.lock().await = Some(writer);
        options.set_minimal_filter(self.minimal_filter);

        debug!(sink = %self.name, path = %self.config.path.display(), "FileSink opened");
        Ok(())
    }

    #[instrument(
        name = "file_sink_handle",
        skip(self, event),
        fields(sink = %self.name, monitor = %event.monitor_id)
    )]
    async fn handle(&self, event: &LogEvent, _parallel: bool) -> Result<(), ContractError> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| ContractError::handler_not_open(&self.name))?;

        self.write_line(writer, event).map_err(|e| {
            error!(sink = %self.name, error = %e, "Write failed");
            ContractError::handler_write(&self.name, e.to_string())
        })
    }

    #[instrument(name = "file_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.flush()?;
        }
        debug!(sink = %self.name, "FileSink closed");
        Ok(())
    }
}
