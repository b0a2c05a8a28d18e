//! RecordCodec trait - external serializer interface used by the transport

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ContractError;

/// Tag identifying the serialization format of a wire payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatVersion(pub u32);

impl FormatVersion {
    /// Compact binary encoding (bincode 1.x)
    pub const BINCODE_V1: FormatVersion = FormatVersion(1);
    /// JSON encoding
    pub const JSON_V1: FormatVersion = FormatVersion(2);
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Serializer for one record type
///
/// `encode` always writes `format_version()`; `decode` must accept any version the codec
/// knows, so payloads from a different protocol version remain readable.
pub trait RecordCodec: Send + Sync + 'static {
    /// Record type carried over the wire
    type Record: Send + 'static;

    /// Version written by `encode`
    fn format_version(&self) -> FormatVersion;

    /// Serialize a record
    ///
    /// # Errors
    /// Returns an encode error with the format name
    fn encode(&self, record: &Self::Record) -> Result<Bytes, ContractError>;

    /// Deserialize a record written in `version`
    ///
    /// # Errors
    /// Returns a decode error, or `UnsupportedFormat` for unknown versions
    fn decode(&self, bytes: &[u8], version: FormatVersion) -> Result<Self::Record, ContractError>;
}
