//! HandlerRegistry - leaf kind tag to constructor
//!
//! Built once at startup; a resolved `HandlerConfig` tree is turned into a live
//! `HandlerNode` tree by looking up each leaf's `kind`.

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{ContractError, Handler, HandlerConfig, LeafConfig};
use tracing::{debug, instrument};

use crate::error::DispatcherError;
use crate::node::{HandlerNode, LeafNode};
use crate::sinks::{FileSink, LogSink, NetworkSink};

/// Constructor for one leaf kind
///
/// Constructors only validate parameters; resources are acquired in `Handler::initialize`.
pub type HandlerFactory =
    Arc<dyn Fn(&LeafConfig) -> Result<Box<dyn Handler>, ContractError> + Send + Sync>;

/// Registry of leaf handler kinds
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl HandlerRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds: `log`, `file`, `network`
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("log", |config| Ok(Box::new(LogSink::from_config(config))));
        registry.register("file", |config| Ok(Box::new(FileSink::from_config(config))));
        registry.register("network", |config| {
            Ok(Box::new(NetworkSink::from_config(config)?))
        });
        registry
    }

    /// Register (or replace) a leaf kind
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&LeafConfig) -> Result<Box<dyn Handler>, ContractError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Construct one leaf handler
    pub fn create_leaf(&self, config: &LeafConfig) -> Result<Box<dyn Handler>, DispatcherError> {
        let factory =
            self.factories
                .get(&config.kind)
                .ok_or_else(|| DispatcherError::UnknownHandlerKind {
                    handler: config.name.clone(),
                    kind: config.kind.clone(),
                })?;

        factory(config).map_err(|e| DispatcherError::handler_creation(&config.name, e.to_string()))
    }

    /// Construct a whole tree (handlers are not initialized yet)
    #[instrument(name = "registry_build_tree", skip(self, config), fields(root = %config.name()))]
    pub fn build_tree(&self, config: &HandlerConfig) -> Result<HandlerNode, DispatcherError> {
        let node = match config {
            HandlerConfig::Leaf(leaf) => {
                let handler = self.create_leaf(leaf)?;
                debug!(handler = %leaf.name, kind = %leaf.kind, "Leaf handler created");
                HandlerNode::Leaf(LeafNode::new(handler))
            }
            HandlerConfig::Sequence { name, children } => {
                HandlerNode::sequence(name, self.build_children(children)?)
            }
            HandlerConfig::Parallel { name, children } => {
                HandlerNode::parallel(name, self.build_children(children)?)
            }
        };
        Ok(node)
    }

    fn build_children(&self, children: &[HandlerConfig]) -> Result<Vec<HandlerNode>, DispatcherError> {
        children.iter().map(|child| self.build_tree(child)).collect()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
