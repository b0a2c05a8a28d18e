//! HandlerNode - resolved handler tree
//!
//! ```text
//! Sequence ──▶ child 0 ──▶ child 1 ──▶ ...   (one after another)
//! Parallel ──▶ child 0
//!          ├─▶ child 1                        (all at once, join)
//!          └─▶ ...
//! ```
//!
//! A failing child never stops its siblings: the failure is logged and the first error
//! is returned once every child has run.

use std::sync::Arc;

use contracts::{ChannelOptions, ContractError, Handler, LogEvent};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{trace, warn};

use crate::metrics::{HandlerMetrics, MetricsSnapshot};

/// Leaf handler with its metrics
pub struct LeafNode {
    handler: Box<dyn Handler>,
    metrics: Arc<HandlerMetrics>,
}

impl LeafNode {
    pub fn new(handler: Box<dyn Handler>) -> Self {
        Self {
            handler,
            metrics: Arc::new(HandlerMetrics::new()),
        }
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }

    pub fn metrics(&self) -> &Arc<HandlerMetrics> {
        &self.metrics
    }

    async fn handle(&self, event: &LogEvent, parallel: bool) -> Result<(), ContractError> {
        if self
            .handler
            .minimal_filter()
            .is_some_and(|min| event.level < min)
        {
            self.metrics.inc_filtered_count();
            trace!(handler = %self.handler.name(), level = %event.level, "Event below leaf filter");
            return Ok(());
        }

        match self.handler.handle(event, parallel).await {
            Ok(()) => {
                self.metrics.inc_handled_count();
                Ok(())
            }
            Err(e) => {
                self.metrics.inc_failure_count();
                Err(e)
            }
        }
    }
}

/// Closed set of handler tree shapes
pub enum HandlerNode {
    Leaf(LeafNode),
    Sequence {
        name: String,
        children: Vec<HandlerNode>,
    },
    Parallel {
        name: String,
        children: Vec<HandlerNode>,
    },
}

impl HandlerNode {
    pub fn leaf(handler: impl Handler + 'static) -> Self {
        HandlerNode::Leaf(LeafNode::new(Box::new(handler)))
    }

    pub fn sequence(name: impl Into<String>, children: Vec<HandlerNode>) -> Self {
        HandlerNode::Sequence {
            name: name.into(),
            children,
        }
    }

    pub fn parallel(name: impl Into<String>, children: Vec<HandlerNode>) -> Self {
        HandlerNode::Parallel {
            name: name.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HandlerNode::Leaf(leaf) => leaf.handler.name(),
            HandlerNode::Sequence { name, .. } | HandlerNode::Parallel { name, .. } => name,
        }
    }

    pub fn children(&self) -> &[HandlerNode] {
        match self {
            HandlerNode::Leaf(_) => &[],
            HandlerNode::Sequence { children, .. } | HandlerNode::Parallel { children, .. } => {
                children
            }
        }
    }

    /// Leaves in declaration order
    pub fn leaves(&self) -> Vec<&LeafNode> {
        match self {
            HandlerNode::Leaf(leaf) => vec![leaf],
            _ => self.children().iter().flat_map(|c| c.leaves()).collect(),
        }
    }

    /// Metrics snapshot of every leaf, keyed by handler name
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.leaves()
            .into_iter()
            .map(|leaf| (leaf.handler.name().to_string(), leaf.metrics.snapshot()))
            .collect()
    }

    /// Initialize every leaf in declaration order, stopping at the first failure
    pub fn initialize<'a>(
        &'a self,
        options: &'a ChannelOptions,
    ) -> BoxFuture<'a, Result<(), ContractError>> {
        async move {
            match self {
                HandlerNode::Leaf(leaf) => leaf.handler.initialize(options).await,
                _ => {
                    for child in self.children() {
                        child.initialize(options).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed()
    }

    /// Forward one event through this subtree
    ///
    /// Sequence keeps the caller's `parallel` hint; Parallel raises it for its children.
    pub fn handle<'a>(
        &'a self,
        event: &'a LogEvent,
        parallel: bool,
    ) -> BoxFuture<'a, Result<(), ContractError>> {
        async move {
            match self {
                HandlerNode::Leaf(leaf) => leaf.handle(event, parallel).await,
                HandlerNode::Sequence { name, children } => {
                    let mut first_error = None;
                    for child in children {
                        if let Err(e) = child.handle(event, parallel).await {
                            warn!(node = %name, child = %child.name(), error = %e, "Child handler failed");
                            first_error.get_or_insert(e);
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                }
                HandlerNode::Parallel { name, children } => {
                    let results =
                        join_all(children.iter().map(|child| child.handle(event, true))).await;
                    let mut first_error = None;
                    for (child, result) in children.iter().zip(results) {
                        if let Err(e) = result {
                            warn!(node = %name, child = %child.name(), error = %e, "Child handler failed");
                            first_error.get_or_insert(e);
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                }
            }
        }
        .boxed()
    }

    /// Close every leaf; all leaves are closed even if some fail
    pub fn close(&self) -> BoxFuture<'_, Result<(), ContractError>> {
        async move {
            match self {
                HandlerNode::Leaf(leaf) => leaf.handler.close().await,
                _ => {
                    let mut first_error = None;
                    for child in self.children() {
                        if let Err(e) = child.close().await {
                            warn!(handler = %child.name(), error = %e, "Handler close failed");
                            first_error.get_or_insert(e);
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                }
            }
        }
        .boxed()
    }
}

impl std::fmt::Debug for HandlerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerNode::Leaf(leaf) => f.debug_tuple("Leaf").field(&leaf.handler.name()).finish(),
            HandlerNode::Sequence { name, children } => f
                .debug_struct("Sequence")
                .field("name", name)
                .field("children", children)
                .finish(),
            HandlerNode::Parallel { name, children } => f
                .debug_struct("Parallel")
                .field("name", name)
                .field("children", children)
                .finish(),
        }
    }
}
