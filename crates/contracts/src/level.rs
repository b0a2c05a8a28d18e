//! Log levels and channel-wide filter aggregation

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

/// Event severity, ordered from most verbose to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl LogLevel {
    /// All levels, most verbose first
    pub const ALL: [LogLevel; 6] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
        }
    }

    fn to_raw(self) -> u8 {
        self as u8 + 1
    }

    fn from_raw(raw: u8) -> Option<Self> {
        raw.checked_sub(1)
            .and_then(|idx| Self::ALL.get(idx as usize).copied())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

/// Options published by the handlers of one channel
///
/// Every handler offers its minimal filter during `initialize`. The aggregate keeps the
/// least restrictive contribution: if any handler wants a level, the channel must not
/// discard it upstream. With no contribution at all the filter stays undefined.
#[derive(Debug, Default)]
pub struct ChannelOptions {
    // 0 = undefined, otherwise LogLevel::to_raw
    minimal_filter: AtomicU8,
}

impl ChannelOptions {
    /// Create options with an undefined filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a handler's minimal filter; `None` contributions are ignored
    pub fn set_minimal_filter(&self, level: Option<LogLevel>) {
        let Some(level) = level else {
            return;
        };
        let raw = level.to_raw();
        let _ = self
            .minimal_filter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current == 0 || raw < current).then_some(raw)
            });
    }

    /// Aggregate filter, `None` when no handler contributed
    pub fn minimal_filter(&self) -> Option<LogLevel> {
        LogLevel::from_raw(self.minimal_filter.load(Ordering::Acquire))
    }

    /// Whether an event at `level` can pass the aggregate filter
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        self.minimal_filter().is_none_or(|min| level >= min)
    }
}
