//! PacketSplitter - sender-side fragmentation

use std::num::NonZeroUsize;

use bytes::Bytes;
use contracts::{FormatVersion, ENVELOPE_HEADER_LEN};

use crate::envelope::{CorrelationId, Envelope};
use crate::error::{Result, TransportError};

/// Slices payloads into envelopes bounded by a maximum fragment size
#[derive(Debug, Clone, Copy)]
pub struct PacketSplitter {
    max_fragment_size: NonZeroUsize,
}

impl PacketSplitter {
    /// Create a splitter with an explicit payload bound per fragment
    pub fn new(max_fragment_size: NonZeroUsize) -> Self {
        Self { max_fragment_size }
    }

    /// Create a splitter for a maximum datagram size (header included)
    ///
    /// # Errors
    /// `InvalidConfig` if the datagram cannot hold the header plus one payload byte
    pub fn for_datagram_size(max_datagram_size: usize) -> Result<Self> {
        NonZeroUsize::new(max_datagram_size.saturating_sub(ENVELOPE_HEADER_LEN))
            .map(Self::new)
            .ok_or_else(|| {
                TransportError::invalid_config(format!(
                    "max datagram size {max_datagram_size} leaves no room after the \
                     {ENVELOPE_HEADER_LEN}-byte header"
                ))
            })
    }

    pub fn max_fragment_size(&self) -> usize {
        self.max_fragment_size.get()
    }

    /// Plan the fragments of `payload` under a fresh correlation id
    ///
    /// An empty payload still yields exactly one (empty) fragment.
    ///
    /// # Errors
    /// `PayloadTooLarge` if the payload needs more than `u16::MAX` fragments
    pub fn split(&self, payload: Bytes, format_version: FormatVersion) -> Result<Fragments> {
        let chunk = self.max_fragment_size.get();
        let needed = payload.len().div_ceil(chunk).max(1);
        let count = u16::try_from(needed).map_err(|_| TransportError::PayloadTooLarge {
            size: payload.len(),
            fragments: needed,
        })?;

        Ok(Fragments {
            correlation_id: CorrelationId::new(),
            format_version,
            payload,
            chunk,
            count,
        })
    }
}

/// Fragment plan for one message
///
/// Iterating is lazy and restartable: every pass yields the same envelopes, in order.
#[derive(Debug, Clone)]
pub struct Fragments {
    correlation_id: CorrelationId,
    format_version: FormatVersion,
    payload: Bytes,
    chunk: usize,
    count: u16,
}

impl Fragments {
    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Number of envelopes this plan yields
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn iter(&self) -> FragmentIter<'_> {
        FragmentIter {
            plan: self,
            next: 0,
        }
    }

    fn envelope(&self, sequence: u16) -> Envelope {
        let start = (sequence as usize * self.chunk).min(self.payload.len());
        let end = (start + self.chunk).min(self.payload.len());
        Envelope {
            correlation_id: self.correlation_id,
            sequence,
            count: self.count,
            format_version: self.format_version,
            payload: self.payload.slice(start..end),
        }
    }
}

impl<'a> IntoIterator for &'a Fragments {
    type Item = Envelope;
    type IntoIter = FragmentIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the envelopes of a [`Fragments`] plan
pub struct FragmentIter<'a> {
    plan: &'a Fragments,
    next: u16,
}

impl Iterator for FragmentIter<'_> {
    type Item = Envelope;

    fn next(&mut self) -> Option<Envelope> {
        if self.next >= self.plan.count {
            return None;
        }
        let envelope = self.plan.envelope(self.next);
        self.next += 1;
        Some(envelope)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.plan.count - self.next) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for FragmentIter<'_> {}
