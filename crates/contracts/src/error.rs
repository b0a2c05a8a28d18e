//! Layered error definitions
//!
//! Categorized by source: config / codec / handler

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Codec Errors =====
    /// Record serialization error
    #[error("encode error ({format}): {message}")]
    Encode { format: String, message: String },

    /// Record deserialization error
    #[error("decode error (format version {version}): {message}")]
    Decode { version: u32, message: String },

    /// Payload written in a format this codec cannot read
    #[error("unsupported format version {version}")]
    UnsupportedFormat { version: u32 },

    // ===== Handler Errors =====
    /// Handler initialization error
    #[error("handler '{handler}' initialization error: {message}")]
    HandlerInit { handler: String, message: String },

    /// Handler write error
    #[error("handler '{handler}' write error: {message}")]
    HandlerWrite { handler: String, message: String },

    /// Handler used before `initialize` or after `close`
    #[error("handler '{handler}' is not open")]
    HandlerNotOpen { handler: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create encode error
    pub fn encode(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encode {
            format: format.into(),
            message: message.into(),
        }
    }

    /// Create decode error
    pub fn decode(version: u32, message: impl Into<String>) -> Self {
        Self::Decode {
            version,
            message: message.into(),
        }
    }

    /// Create handler initialization error
    pub fn handler_init(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerInit {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create handler write error
    pub fn handler_write(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerWrite {
            handler: handler.into(),
            message: message.into(),
        }
    }

    /// Create handler-not-open error
    pub fn handler_not_open(handler: impl Into<String>) -> Self {
        Self::HandlerNotOpen {
            handler: handler.into(),
        }
    }
}
