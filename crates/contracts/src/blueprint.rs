//! PipelineBlueprint - Config Loader output
//!
//! Describes an already resolved pipeline: transport endpoints and, per channel, the
//! handler tree to dispatch through.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::LogLevel;

/// Wire header size: correlation id (16) + sequence (2) + count (2) + format version (4)
pub const ENVELOPE_HEADER_LEN: usize = 24;

/// Largest UDP payload over IPv4
pub const MAX_UDP_DATAGRAM: usize = 65_507;

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete pipeline blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Network transport settings
    #[serde(default)]
    pub transport: TransportSettings,

    /// Channel routes
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// Network transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Local address the receive pumps bind to
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Destination for senders (unicast or broadcast address)
    #[serde(default = "default_destination_host")]
    pub destination_host: String,

    /// Port for ordinary log records
    #[serde(default = "default_log_port")]
    pub log_port: u16,

    /// Port for critical errors raised inside the logging subsystem
    #[serde(default = "default_critical_error_port")]
    pub critical_error_port: u16,

    /// Maximum datagram size including the envelope header
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// Enable SO_BROADCAST on sender sockets
    #[serde(default)]
    pub broadcast: bool,

    /// Upper bound on waiting for pump loops during dispose
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Evict incomplete reassemblies older than this (None = never evict)
    #[serde(default)]
    pub reassembly_ttl_ms: Option<u64>,
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_destination_host() -> String {
    "127.0.0.1".to_string()
}

fn default_log_port() -> u16 {
    48042
}

fn default_critical_error_port() -> u16 {
    48043
}

fn default_max_datagram_size() -> usize {
    1280
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            destination_host: default_destination_host(),
            log_port: default_log_port(),
            critical_error_port: default_critical_error_port(),
            max_datagram_size: default_max_datagram_size(),
            broadcast: false,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            reassembly_ttl_ms: None,
        }
    }
}

impl TransportSettings {
    /// Payload bytes available per fragment once the header is subtracted
    pub fn max_fragment_payload(&self) -> usize {
        self.max_datagram_size.saturating_sub(ENVELOPE_HEADER_LEN)
    }
}

/// One named channel and its resolved handler tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel name
    pub name: String,

    /// Root of the handler tree
    pub root: HandlerConfig,
}

/// Resolved handler tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerConfig {
    /// Children run one after another, in declaration order
    Sequence {
        name: String,
        #[serde(default)]
        children: Vec<HandlerConfig>,
    },
    /// Children run concurrently
    Parallel {
        name: String,
        #[serde(default)]
        children: Vec<HandlerConfig>,
    },
    /// Registered sink kind
    Leaf(LeafConfig),
}

impl HandlerConfig {
    /// Handler name
    pub fn name(&self) -> &str {
        match self {
            HandlerConfig::Sequence { name, .. } | HandlerConfig::Parallel { name, .. } => name,
            HandlerConfig::Leaf(leaf) => &leaf.name,
        }
    }

    /// Direct children (empty for leaves)
    pub fn children(&self) -> &[HandlerConfig] {
        match self {
            HandlerConfig::Sequence { children, .. } | HandlerConfig::Parallel { children, .. } => {
                children
            }
            HandlerConfig::Leaf(_) => &[],
        }
    }

    /// Depth-first walk over every node of the tree
    pub fn walk(&self) -> Vec<&HandlerConfig> {
        let mut out = vec![self];
        for child in self.children() {
            out.extend(child.walk());
        }
        out
    }
}

/// Leaf handler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafConfig {
    /// Handler name
    pub name: String,

    /// Registered kind tag ("log", "file", "network", ...)
    pub kind: String,

    /// Minimum level this leaf wants
    #[serde(default)]
    pub minimal_filter: Option<LogLevel>,

    /// Kind-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl LeafConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            minimal_filter: None,
            params: HashMap::new(),
        }
    }

    pub fn with_filter(mut self, level: LogLevel) -> Self {
        self.minimal_filter = Some(level);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_config_json_shape() {
        let json = r#"{
            "type": "parallel",
            "name": "root",
            "children": [
                { "type": "leaf", "name": "console", "kind": "log", "minimal_filter": "warning" },
                { "type": "sequence", "name": "files", "children": [] }
            ]
        }"#;
        let config: HandlerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name(), "root");
        assert_eq!(config.children().len(), 2);

        let names: Vec<_> = config.walk().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["root", "console", "files"]);

        match &config.children()[0] {
            HandlerConfig::Leaf(leaf) => {
                assert_eq!(leaf.kind, "log");
                assert_eq!(leaf.minimal_filter, Some(LogLevel::Warning));
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn test_default_transport_settings() {
        let settings = TransportSettings::default();
        assert_eq!(settings.max_datagram_size, 1280);
        assert_eq!(settings.max_fragment_payload(), 1256);
        assert_ne!(settings.log_port, settings.critical_error_port);
        assert!(settings.reassembly_ttl_ms.is_none());
    }
}
