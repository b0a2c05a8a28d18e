//! Router - routing table from channel name to live channel
//!
//! ```text
//! dispatch ─▶ read lock ─▶ lookup + pre_handle_lock ─▶ unlock ─▶ handle ─▶ release
//! apply    ─▶ build + initialize ─▶ write lock ─▶ swap ─▶ unlock ─▶ retire old
//! ```
//!
//! The table lock is held only for the lookup, never across `handle`. Once the table is
//! swapped no new lease can reach an old channel, and retiring waits out the leases
//! that were already taken.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use contracts::{ChannelConfig, LogEvent};
use futures::future::join_all;
use observability::metrics;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::channel::{Channel, ChannelLease};
use crate::error::DispatcherError;
use crate::registry::HandlerRegistry;

/// Event dispatcher over a replaceable set of channels
#[derive(Debug)]
pub struct Router {
    registry: HandlerRegistry,
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    reconfigure: Mutex<()>,
}

impl Router {
    /// Router with no channels
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            channels: RwLock::new(HashMap::new()),
            reconfigure: Mutex::new(()),
        }
    }

    /// Router with the built-in handler kinds and the given channels
    pub async fn with_channels(configs: &[ChannelConfig]) -> Result<Self, DispatcherError> {
        let router = Self::new(HandlerRegistry::with_builtin());
        router.apply(configs).await?;
        Ok(router)
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Current channel by name
    pub async fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Names of the current channels, sorted
    pub async fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().await.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Look up a channel and take its pre-handle lock
    ///
    /// # Errors
    /// `UnknownChannel` if no channel has this name
    pub async fn lease(&self, channel: &str) -> Result<ChannelLease, DispatcherError> {
        let channels = self.channels.read().await;
        let found = channels
            .get(channel)
            .ok_or_else(|| DispatcherError::unknown_channel(channel))?;
        let lease = found.pre_handle_lock()?;
        Ok(lease)
    }

    /// Dispatch one event to a channel
    ///
    /// Returns `false` when the channel's filter dropped the event.
    pub async fn dispatch(&self, channel: &str, event: &LogEvent) -> Result<bool, DispatcherError> {
        let lease = self.lease(channel).await?;
        lease.handle(event).await
    }

    /// Replace the whole routing table
    ///
    /// New channels are built and initialized first; if any fails, the ones built so far
    /// are retired and the current table stays in place. Otherwise the table is swapped
    /// and every previous channel is retired.
    #[instrument(name = "router_apply", skip(self, configs), fields(channels = configs.len()))]
    pub async fn apply(&self, configs: &[ChannelConfig]) -> Result<(), DispatcherError> {
        let _guard = self.reconfigure.lock().await;

        let mut seen = HashSet::new();
        if let Some(dup) = configs.iter().find(|c| !seen.insert(c.name.as_str())) {
            return Err(DispatcherError::DuplicateChannel {
                name: dup.name.clone(),
            });
        }

        let mut built = HashMap::with_capacity(configs.len());
        for config in configs {
            match self.open_channel(config).await {
                Ok(channel) => {
                    built.insert(config.name.clone(), channel);
                }
                Err(e) => {
                    warn!(channel = %config.name, error = %e, "Channel build failed, keeping current configuration");
                    retire_all(built.into_values()).await;
                    return Err(e);
                }
            }
        }

        let previous = {
            let mut channels = self.channels.write().await;
            std::mem::replace(&mut *channels, built)
        };
        let active = configs.len();
        let retired = previous.len();
        retire_all(previous.into_values()).await;

        metrics::record_reconfiguration(active);
        info!(active, retired, "Routing table replaced");
        Ok(())
    }

    async fn open_channel(&self, config: &ChannelConfig) -> Result<Arc<Channel>, DispatcherError> {
        let root = self.registry.build_tree(&config.root)?;
        Channel::open(&config.name, root).await
    }

    /// Retire every channel; later dispatches fail with `UnknownChannel`
    #[instrument(name = "router_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let _guard = self.reconfigure.lock().await;
        let previous = std::mem::take(&mut *self.channels.write().await);
        let count = previous.len();
        retire_all(previous.into_values()).await;
        debug!(channels = count, "Router shut down");
    }
}

async fn retire_all(channels: impl IntoIterator<Item = Arc<Channel>>) {
    let retiring = channels.into_iter().map(|channel| async move {
        if let Err(e) = channel.retire().await {
            warn!(channel = %channel.name(), error = %e, "Channel retired with errors");
        }
    });
    join_all(retiring).await;
}
