//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Listen channel missing from the routing table
    #[error("Channel '{channel}' is not configured (available: {available})")]
    ChannelNotConfigured { channel: String, available: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn channel_not_configured(channel: impl Into<String>, available: &[String]) -> Self {
        Self::ChannelNotConfigured {
            channel: channel.into(),
            available: if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            },
        }
    }
}
