//! Serde-based record codecs

use std::marker::PhantomData;

use bytes::Bytes;
use contracts::{ContractError, CriticalError, FormatVersion, LogEvent, RecordCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialization format for outgoing payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireFormat {
    /// Bincode (binary, compact)
    #[default]
    Bincode,
    /// JSON (human-readable, larger)
    Json,
}

impl WireFormat {
    pub fn version(&self) -> FormatVersion {
        match self {
            WireFormat::Bincode => FormatVersion::BINCODE_V1,
            WireFormat::Json => FormatVersion::JSON_V1,
        }
    }

    pub fn from_version(version: FormatVersion) -> Option<Self> {
        match version {
            FormatVersion::BINCODE_V1 => Some(WireFormat::Bincode),
            FormatVersion::JSON_V1 => Some(WireFormat::Json),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            WireFormat::Bincode => "bincode",
            WireFormat::Json => "json",
        }
    }
}

/// Codec for any serde record
///
/// Writes the configured format and reads every format it knows.
pub struct SerdeCodec<R> {
    format: WireFormat,
    _record: PhantomData<fn() -> R>,
}

impl<R> SerdeCodec<R> {
    pub fn new(format: WireFormat) -> Self {
        Self {
            format,
            _record: PhantomData,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }
}

impl<R> Default for SerdeCodec<R> {
    fn default() -> Self {
        Self::new(WireFormat::default())
    }
}

impl<R> Clone for SerdeCodec<R> {
    fn clone(&self) -> Self {
        Self::new(self.format)
    }
}

impl<R> RecordCodec for SerdeCodec<R>
where
    R: Serialize + DeserializeOwned + Send + 'static,
{
    type Record = R;

    fn format_version(&self) -> FormatVersion {
        self.format.version()
    }

    fn encode(&self, record: &R) -> Result<Bytes, ContractError> {
        let data = match self.format {
            WireFormat::Bincode => bincode::serialize(record)
                .map_err(|e| ContractError::encode(self.format.name(), e.to_string()))?,
            WireFormat::Json => serde_json::to_vec(record)
                .map_err(|e| ContractError::encode(self.format.name(), e.to_string()))?,
        };
        Ok(Bytes::from(data))
    }

    fn decode(&self, bytes: &[u8], version: FormatVersion) -> Result<R, ContractError> {
        match WireFormat::from_version(version) {
            Some(WireFormat::Bincode) => bincode::deserialize(bytes)
                .map_err(|e| ContractError::decode(version.0, e.to_string())),
            Some(WireFormat::Json) => serde_json::from_slice(bytes)
                .map_err(|e| ContractError::decode(version.0, e.to_string())),
            None => Err(ContractError::UnsupportedFormat { version: version.0 }),
        }
    }
}

/// Codec for ordinary log records
pub type LogEventCodec = SerdeCodec<LogEvent>;

/// Codec for critical errors
pub type CriticalErrorCodec = SerdeCodec<CriticalError>;
