//! Per-leaf handler metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for a single leaf handler
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    /// Events handled successfully
    handled_count: AtomicU64,
    /// Events the handler failed on
    failure_count: AtomicU64,
    /// Events skipped by the leaf's own filter
    filtered_count: AtomicU64,
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handled_count(&self) -> u64 {
        self.handled_count.load(Ordering::Relaxed)
    }

    pub fn inc_handled_count(&self) {
        self.handled_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn inc_failure_count(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn filtered_count(&self) -> u64 {
        self.filtered_count.load(Ordering::Relaxed)
    }

    pub fn inc_filtered_count(&self) {
        self.filtered_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            handled_count: self.handled_count(),
            failure_count: self.failure_count(),
            filtered_count: self.filtered_count(),
        }
    }
}

/// Snapshot of handler metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub handled_count: u64,
    pub failure_count: u64,
    pub filtered_count: u64,
}
