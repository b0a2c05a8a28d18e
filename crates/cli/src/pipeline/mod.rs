//! Receive-side orchestration.

mod listener;
mod stats;

pub use listener::{Listener, ListenerConfig};
pub use stats::ListenStats;
