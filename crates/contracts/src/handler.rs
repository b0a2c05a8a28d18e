//! Handler trait - leaf sink interface
//!
//! Composite shapes (sequence / parallel) live in the dispatcher; this trait is the
//! open extension point for new leaf kinds.

use async_trait::async_trait;

use crate::{ChannelOptions, ContractError, LogEvent, LogLevel};

/// Leaf sink that stores or forwards log events
///
/// A handler is shared by every producer dispatching through its channel, so all
/// operations take `&self` and implementations guard their own state.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Configuration identity (used for logging/metrics)
    fn name(&self) -> &str;

    /// Minimum level this handler wants, `None` for no preference
    fn minimal_filter(&self) -> Option<LogLevel> {
        None
    }

    /// Open resources and publish the filter contribution
    ///
    /// Called once, before any `handle`.
    async fn initialize(&self, options: &ChannelOptions) -> Result<(), ContractError> {
        options.set_minimal_filter(self.minimal_filter());
        Ok(())
    }

    /// Handle one event
    ///
    /// `parallel` is true when siblings may be handling the same event concurrently.
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn handle(&self, event: &LogEvent, parallel: bool) -> Result<(), ContractError>;

    /// Release resources; no `handle` call is in flight when this runs
    async fn close(&self) -> Result<(), ContractError>;
}
