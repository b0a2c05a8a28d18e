//! Transport error types

use thiserror::Error;

/// Transport-specific errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Datagram too short or header inconsistent
    #[error("malformed fragment: {reason}")]
    MalformedFragment { reason: String },

    /// Payload needs more fragments than the u16 header field can count
    #[error("payload of {size} bytes needs {fragments} fragments, limit is 65535")]
    PayloadTooLarge { size: usize, fragments: usize },

    /// Sender or pump configuration cannot be used
    #[error("invalid transport configuration: {reason}")]
    InvalidConfig { reason: String },

    /// `start` called on a pump that already started
    #[error("receive pump already started")]
    AlreadyStarted,

    /// Lifecycle call that requires a started pump
    #[error("receive pump not started")]
    NotStarted,

    /// Consumer callback returned an error or panicked
    #[error("consumer callback failed: {message}")]
    CallbackFailure { message: String },

    /// Socket closed by `stop` / `dispose` (normal shutdown)
    #[error("socket closed")]
    SocketClosed,

    /// Record codec error (from contract)
    #[error("codec error: {0}")]
    Codec(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a malformed fragment error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedFragment {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a callback failure error
    pub fn callback_failure(message: impl Into<String>) -> Self {
        Self::CallbackFailure {
            message: message.into(),
        }
    }

    /// Whether this error is the expected result of shutting down
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::SocketClosed)
    }
}

/// Result alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
