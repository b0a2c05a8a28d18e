//! Test doubles shared by the unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use contracts::{ChannelOptions, ContractError, Handler, LogEvent, LogLevel};

/// Ordered record of handler activity ("name:start", "name:end", "name:close")
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Handler that journals its calls and detects use after close
pub struct RecordingHandler {
    name: String,
    journal: Journal,
    delay: Option<Duration>,
    fail: bool,
    fail_open: bool,
    filter: Option<LogLevel>,
    hints: Arc<Mutex<Vec<bool>>>,
    active: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    violations: Arc<AtomicUsize>,
}

impl RecordingHandler {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            delay: None,
            fail: false,
            fail_open: false,
            filter: None,
            hints: Arc::default(),
            active: Arc::default(),
            closed: Arc::default(),
            violations: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_filter(mut self, level: LogLevel) -> Self {
        self.filter = Some(level);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// `initialize` fails, and so does the `close` that follows it
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn with_violations(mut self, violations: &Arc<AtomicUsize>) -> Self {
        self.violations = Arc::clone(violations);
        self
    }

    pub fn hints(&self) -> Arc<Mutex<Vec<bool>>> {
        Arc::clone(&self.hints)
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimal_filter(&self) -> Option<LogLevel> {
        self.filter
    }

    async fn initialize(&self, options: &ChannelOptions) -> Result<(), ContractError> {
        if self.fail_open {
            return Err(ContractError::handler_init(&self.name, "cannot open"));
        }
        options.set_minimal_filter(self.filter);
        Ok(())
    }

    async fn handle(&self, _event: &LogEvent, parallel: bool) -> Result<(), ContractError> {
        if self.closed.load(Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        self.hints.lock().unwrap().push(parallel);
        self.journal.push(format!("{}:start", self.name));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            return Err(ContractError::handler_write(&self.name, "boom"));
        }
        self.journal.push(format!("{}:end", self.name));
        Ok(())
    }

    async fn close(&self) -> Result<(), ContractError> {
        if self.active.load(Ordering::SeqCst) > 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        self.closed.store(true, Ordering::SeqCst);
        self.journal.push(format!("{}:close", self.name));
        if self.fail_open {
            return Err(ContractError::handler_not_open(&self.name));
        }
        Ok(())
    }
}
