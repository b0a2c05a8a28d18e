//! LogEvent / CriticalError - records moved by the pipeline

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::LogLevel;

/// Log event emitted by a monitor
///
/// The payload is already serialized by the producer; the core never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Emitting monitor identifier
    pub monitor_id: String,

    /// Time the event was logged
    pub log_time: DateTime<Utc>,

    /// Severity (used only for filtering)
    pub level: LogLevel,

    /// Serialized record (opaque)
    pub payload: Bytes,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(monitor_id: impl Into<String>, level: LogLevel, payload: impl Into<Bytes>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            log_time: Utc::now(),
            level,
            payload: payload.into(),
        }
    }

    /// Override the log time
    pub fn with_log_time(mut self, log_time: DateTime<Utc>) -> Self {
        self.log_time = log_time;
        self
    }

    /// Payload as UTF-8 text, if it is text
    pub fn payload_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

/// Failure raised inside the logging subsystem itself
///
/// Travels on its own port so it cannot be swallowed by the pipeline that is failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticalError {
    /// Monitor that was being served, if known
    pub monitor_id: Option<String>,

    /// Plain-text description
    pub message: String,

    /// Time the failure was observed
    pub raised_at: DateTime<Utc>,
}

impl CriticalError {
    pub fn new(monitor_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            monitor_id,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_json_round_trip() {
        let event = LogEvent::new("monitor-1", LogLevel::Info, "hello");
        let json = serde_json::to_string(&event).unwrap();
        let back: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert_eq!(back.payload_text(), Some("hello"));
    }

    #[test]
    fn test_binary_payload_is_not_text() {
        let event = LogEvent::new("m", LogLevel::Debug, vec![0xff, 0xfe]);
        assert_eq!(event.payload_text(), None);
    }
}
