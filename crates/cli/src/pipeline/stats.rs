//! Listen statistics.

use std::time::Duration;

use observability::ReceiveStatsAggregator;

/// Statistics from a listen run
#[derive(Debug, Clone, Default)]
pub struct ListenStats {
    /// Channel the records were dispatched to
    pub channel: String,

    /// Records the channel accepted (passed its filter)
    pub events_delivered: u64,

    /// Records the channel filter dropped
    pub events_filtered: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Per-monitor / per-level aggregation of received records
    pub received: ReceiveStatsAggregator,
}

impl ListenStats {
    /// Received records per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.received.total_events as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!();
        println!("=== Listen Statistics ===");
        println!("  Channel: {}", self.channel);
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Delivered: {}", self.events_delivered);
        println!("  Filtered: {}", self.events_filtered);
        println!("  Rate: {:.2} events/s", self.events_per_sec());
        println!();
        print!("{}", self.received.summary());
        println!();
    }
}
