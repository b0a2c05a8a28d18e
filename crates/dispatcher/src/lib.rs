//! # Dispatcher
//!
//! 事件分发模块。
//!
//! 负责：
//! - 将解析后的配置构建为 handler 树 (Leaf / Sequence / Parallel)
//! - 按 channel 路由 `LogEvent`
//! - 通过 pre-handle lock 保证重配置时不会关闭仍在使用的 handler

pub mod channel;
pub mod error;
pub mod metrics;
pub mod node;
pub mod registry;
pub mod router;
pub mod sinks;

#[cfg(test)]
mod testing;

pub use channel::{Channel, ChannelLease};
pub use contracts::{Handler, LogEvent};
pub use error::DispatcherError;
pub use metrics::{HandlerMetrics, MetricsSnapshot};
pub use node::{HandlerNode, LeafNode};
pub use registry::{HandlerFactory, HandlerRegistry};
pub use router::Router;
pub use sinks::{FileSink, FileSinkConfig, LogSink, NetworkSink, NetworkSinkConfig};
