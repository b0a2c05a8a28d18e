//! Channel - a named handler tree guarded by the pre-handle lock
//!
//! Every dispatch holds a `ChannelLease` from `pre_handle_lock` until it is done with the
//! tree. `retire` refuses new leases, waits for the in-flight count to reach zero and
//! only then closes the handlers, so no handler is closed under a running `handle`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use contracts::{ChannelOptions, LogEvent};
use observability::metrics;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::DispatcherError;
use crate::metrics::MetricsSnapshot;
use crate::node::HandlerNode;

/// Named route binding a handler tree to its aggregated filter
pub struct Channel {
    name: String,
    root: HandlerNode,
    options: ChannelOptions,
    in_flight: AtomicUsize,
    retired: AtomicBool,
    drained: Notify,
}

impl Channel {
    /// Initialize the tree and publish its filter contributions
    ///
    /// On failure the handlers opened so far are closed again.
    #[instrument(name = "channel_open", skip(root))]
    pub async fn open(name: &str, root: HandlerNode) -> Result<Arc<Self>, DispatcherError> {
        let channel = Self {
            name: name.to_string(),
            root,
            options: ChannelOptions::new(),
            in_flight: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            drained: Notify::new(),
        };

        if let Err(e) = channel.root.initialize(&channel.options).await {
            if let Err(close_error) = channel.root.close().await {
                warn!(
                    channel = %channel.name,
                    error = %close_error,
                    "Close after failed initialize reported errors"
                );
            }
            return Err(e.into());
        }

        debug!(
            channel = %channel.name,
            minimal_filter = ?channel.options.minimal_filter(),
            "Channel opened"
        );
        Ok(Arc::new(channel))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn root(&self) -> &HandlerNode {
        &self.root
    }

    /// Leases currently open against this tree
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.root.metrics()
    }

    /// Take a lease on the current tree
    ///
    /// # Errors
    /// `ChannelRetired` once `retire` has started
    pub fn pre_handle_lock(self: &Arc<Self>) -> Result<ChannelLease, DispatcherError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.retired.load(Ordering::SeqCst) {
            self.release();
            return Err(DispatcherError::ChannelRetired {
                name: self.name.clone(),
            });
        }
        Ok(ChannelLease {
            channel: Arc::clone(self),
        })
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.retired.load(Ordering::SeqCst) {
            self.drained.notify_waiters();
        }
    }

    /// Refuse new leases, wait for open ones, then close every handler
    ///
    /// Only the first call closes the tree.
    #[instrument(name = "channel_retire", skip(self), fields(channel = %self.name))]
    pub async fn retire(&self) -> Result<(), DispatcherError> {
        if self.retired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                break;
            }
            trace!(channel = %self.name, in_flight = self.in_flight(), "Waiting for leases");
            drained.await;
        }

        self.root.close().await?;
        info!(channel = %self.name, "Channel retired");
        Ok(())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("in_flight", &self.in_flight())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Open pre-handle lock on one channel
///
/// Released by `handle`, by `cancel`, or when dropped.
#[must_use = "dropping a lease releases it without dispatching"]
#[derive(Debug)]
pub struct ChannelLease {
    channel: Arc<Channel>,
}

impl ChannelLease {
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Dispatch one event through the leased tree, then release the lease
    ///
    /// Returns `false` when the channel's aggregate filter drops the event.
    pub async fn handle(self, event: &LogEvent) -> Result<bool, DispatcherError> {
        let channel = &self.channel;
        if !channel.options.is_enabled(event.level) {
            trace!(channel = %channel.name, level = %event.level, "Event below channel filter");
            return Ok(false);
        }

        let result = channel.root.handle(event, false).await;
        metrics::record_event_dispatched(&channel.name, result.is_ok());
        result?;
        Ok(true)
    }

    /// Release the lease without dispatching
    pub fn cancel(self) {
        trace!(channel = %self.channel.name, "Pre-handle lock cancelled");
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.channel.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Journal, RecordingHandler};
    use contracts::LogLevel;
    use std::time::Duration;

    async fn open_channel(journal: &Journal, delay: Option<Duration>) -> Arc<Channel> {
        let mut handler = RecordingHandler::new("leaf", journal).with_filter(LogLevel::Info);
        if let Some(delay) = delay {
            handler = handler.with_delay(delay);
        }
        Channel::open("main", HandlerNode::leaf(handler)).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_failure_closes_tree_and_keeps_init_error() {
        let journal = Journal::default();
        let root = HandlerNode::sequence(
            "root",
            vec![
                HandlerNode::leaf(RecordingHandler::new("ok", &journal)),
                HandlerNode::leaf(RecordingHandler::new("broken", &journal).failing_open()),
            ],
        );

        let err = Channel::open("main", root).await.unwrap_err();
        assert!(matches!(
            err,
            DispatcherError::Contract(contracts::ContractError::HandlerInit { .. })
        ));
        assert_eq!(journal.entries(), vec!["ok:close", "broken:close"]);
    }

    #[tokio::test]
    async fn test_lease_counts_in_flight() {
        let journal = Journal::default();
        let channel = open_channel(&journal, None).await;

        let first = channel.pre_handle_lock().unwrap();
        let second = channel.pre_handle_lock().unwrap();
        assert_eq!(channel.in_flight(), 2);

        first.cancel();
        assert_eq!(channel.in_flight(), 1);

        let delivered = second
            .handle(&LogEvent::new("m", LogLevel::Warning, "x"))
            .await
            .unwrap();
        assert!(delivered);
        assert_eq!(channel.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_channel_filter_drops_verbose_events() {
        let journal = Journal::default();
        let channel = open_channel(&journal, None).await;
        assert_eq!(channel.options().minimal_filter(), Some(LogLevel::Info));

        let lease = channel.pre_handle_lock().unwrap();
        let delivered = lease
            .handle(&LogEvent::new("m", LogLevel::Debug, "x"))
            .await
            .unwrap();
        assert!(!delivered);
        assert!(journal.entries().is_empty());
    }

    #[tokio::test]
    async fn test_retire_refuses_new_leases() {
        let journal = Journal::default();
        let channel = open_channel(&journal, None).await;

        channel.retire().await.unwrap();
        assert!(matches!(
            channel.pre_handle_lock(),
            Err(DispatcherError::ChannelRetired { .. })
        ));
        assert_eq!(channel.in_flight(), 0);
        assert_eq!(journal.entries(), vec!["leaf:close"]);

        // Second retire is a no-op
        channel.retire().await.unwrap();
        assert_eq!(journal.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_retire_waits_for_in_flight_handle() {
        let journal = Journal::default();
        let channel = open_channel(&journal, Some(Duration::from_millis(100))).await;

        let lease = channel.pre_handle_lock().unwrap();
        let dispatch = tokio::spawn(async move {
            lease
                .handle(&LogEvent::new("m", LogLevel::Error, "x"))
                .await
                .unwrap()
        });
        // Let the dispatch reach the handler
        tokio::time::sleep(Duration::from_millis(20)).await;

        channel.retire().await.unwrap();
        assert!(dispatch.await.unwrap());
        assert_eq!(
            journal.entries(),
            vec!["leaf:start", "leaf:end", "leaf:close"]
        );
    }

    #[tokio::test]
    async fn test_retire_waits_for_unused_lease() {
        let journal = Journal::default();
        let channel = open_channel(&journal, None).await;
        let lease = channel.pre_handle_lock().unwrap();

        let retiring = {
            let channel = Arc::clone(&channel);
            tokio::spawn(async move { channel.retire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!retiring.is_finished());
        assert!(journal.entries().is_empty());

        drop(lease);
        retiring.await.unwrap().unwrap();
        assert_eq!(journal.entries(), vec!["leaf:close"]);
    }

    #[tokio::test]
    async fn test_failed_initialize_closes_tree() {
        use async_trait::async_trait;
        use contracts::{ContractError, Handler};

        struct Broken;

        #[async_trait]
        impl Handler for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            async fn initialize(&self, _: &ChannelOptions) -> Result<(), ContractError> {
                Err(ContractError::handler_init("broken", "no resource"))
            }
            async fn handle(&self, _: &LogEvent, _: bool) -> Result<(), ContractError> {
                Ok(())
            }
            async fn close(&self) -> Result<(), ContractError> {
                Ok(())
            }
        }

        let journal = Journal::default();
        let root = HandlerNode::sequence(
            "root",
            vec![
                HandlerNode::leaf(RecordingHandler::new("ok", &journal)),
                HandlerNode::leaf(Broken),
            ],
        );
        let err = Channel::open("main", root).await.unwrap_err();
        assert!(matches!(err, DispatcherError::Contract(_)));
        assert_eq!(journal.entries(), vec!["ok:close"]);
    }
}
