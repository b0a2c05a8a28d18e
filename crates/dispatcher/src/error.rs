//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No channel with this name in the routing table
    #[error("unknown channel '{name}'")]
    UnknownChannel { name: String },

    /// Leaf kind not present in the handler registry
    #[error("handler '{handler}': unknown kind '{kind}'")]
    UnknownHandlerKind { handler: String, kind: String },

    /// Channel was retired by a reconfiguration
    #[error("channel '{name}' has been retired")]
    ChannelRetired { name: String },

    /// Handler creation error
    #[error("failed to create handler '{handler}': {message}")]
    HandlerCreation { handler: String, message: String },

    /// Same channel name declared twice
    #[error("channel '{name}' declared more than once")]
    DuplicateChannel { name: String },

    /// Handler error (from contract)
    #[error("handler error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    pub fn unknown_channel(name: impl Into<String>) -> Self {
        Self::UnknownChannel { name: name.into() }
    }

    /// Create a handler creation error
    pub fn handler_creation(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerCreation {
            handler: handler.into(),
            message: message.into(),
        }
    }
}
