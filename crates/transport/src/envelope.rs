//! Envelope - one UDP datagram's worth of a fragmented message
//!
//! Wire layout (little-endian integers):
//!
//! | Field          | Size     |
//! |----------------|----------|
//! | correlation_id | 16 bytes |
//! | sequence       | 2 bytes  |
//! | count          | 2 bytes  |
//! | format_version | 4 bytes  |
//! | payload        | rest     |

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use contracts::{FormatVersion, ENVELOPE_HEADER_LEN};
use uuid::Uuid;

use crate::error::{Result, TransportError};

/// Identifier grouping all envelopes of one logical message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One fragment on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub correlation_id: CorrelationId,
    /// Index of this fragment, `0 <= sequence < count`
    pub sequence: u16,
    /// Total fragments of the message
    pub count: u16,
    pub format_version: FormatVersion,
    pub payload: Bytes,
}

impl Envelope {
    /// Bytes needed to encode this envelope
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_HEADER_LEN + self.payload.len()
    }

    /// Append the wire form to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_slice(self.correlation_id.as_bytes());
        buf.put_u16_le(self.sequence);
        buf.put_u16_le(self.count);
        buf.put_u32_le(self.format_version.0);
        buf.put_slice(&self.payload);
    }

    /// Encode into a standalone datagram
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Decode a datagram
    ///
    /// # Errors
    /// `MalformedFragment` if the datagram is shorter than the header, the count is zero,
    /// or the sequence number is out of range
    pub fn decode(mut datagram: Bytes) -> Result<Self> {
        if datagram.len() < ENVELOPE_HEADER_LEN {
            return Err(TransportError::malformed(format!(
                "datagram of {} bytes is shorter than the {ENVELOPE_HEADER_LEN}-byte header",
                datagram.len()
            )));
        }

        let mut id = [0u8; 16];
        datagram.copy_to_slice(&mut id);
        let sequence = datagram.get_u16_le();
        let count = datagram.get_u16_le();
        let format_version = FormatVersion(datagram.get_u32_le());

        let envelope = Self {
            correlation_id: CorrelationId::from_bytes(id),
            sequence,
            count,
            format_version,
            payload: datagram,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check the header invariants: `count > 0` and `sequence < count`
    ///
    /// # Errors
    /// `MalformedFragment` naming the violated invariant
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(TransportError::malformed("fragment count is zero"));
        }
        if self.sequence >= self.count {
            return Err(TransportError::malformed(format!(
                "sequence {} out of range for count {}",
                self.sequence, self.count
            )));
        }
        Ok(())
    }
}
