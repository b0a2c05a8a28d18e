//! PacketComposer - receiver-side reassembly
//!
//! Not designed for concurrent use: one receive loop owns the composer and feeds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use contracts::{ContractError, FormatVersion, RecordCodec};
use observability::metrics;
use tracing::{debug, trace, warn};

use crate::envelope::{CorrelationId, Envelope};
use crate::error::{Result, TransportError};

/// Decodes a reassembled payload written in the given format
pub type Decoder<T> =
    Box<dyn Fn(&[u8], FormatVersion) -> std::result::Result<T, ContractError> + Send + Sync>;

/// Receives every restored object
pub type RestoredCallback<T> = Box<dyn FnMut(T) + Send>;

/// Outcome of pushing one fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentStatus {
    /// Stored, message still incomplete
    Buffered,
    /// Slot already held a fragment; overwritten
    Duplicate,
    /// Message completed and handed to the callback
    Restored,
}

/// Slot array for one correlation id
struct Reassembly {
    slots: Vec<Option<Envelope>>,
    filled: usize,
    first_seen: Instant,
}

impl Reassembly {
    fn new(count: u16) -> Self {
        Self {
            slots: vec![None; count as usize],
            filled: 0,
            first_seen: Instant::now(),
        }
    }

    /// Store a fragment, returns true if the slot was already taken
    fn insert(&mut self, envelope: Envelope) -> bool {
        let slot = &mut self.slots[envelope.sequence as usize];
        let duplicate = slot.is_some();
        if !duplicate {
            self.filled += 1;
        }
        *slot = Some(envelope);
        duplicate
    }

    fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Concatenate payloads in index order, with the format of fragment 0
    fn assemble(self) -> (Bytes, FormatVersion) {
        let total = self
            .slots
            .iter()
            .flatten()
            .map(|e| e.payload.len())
            .sum();
        let mut format = None;
        let mut buf = BytesMut::with_capacity(total);
        for envelope in self.slots.into_iter().flatten() {
            format.get_or_insert(envelope.format_version);
            buf.extend_from_slice(&envelope.payload);
        }
        (buf.freeze(), format.unwrap_or(FormatVersion::BINCODE_V1))
    }
}

/// Accumulates fragments per correlation id and restores complete messages
pub struct PacketComposer<T> {
    buffers: HashMap<CorrelationId, Reassembly>,
    decoder: Decoder<T>,
    on_restored: Option<RestoredCallback<T>>,
    ttl: Option<Duration>,
}

impl<T: Send + 'static> PacketComposer<T> {
    /// Create a composer with a custom decoder
    pub fn new<F>(decoder: F) -> Self
    where
        F: Fn(&[u8], FormatVersion) -> std::result::Result<T, ContractError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            buffers: HashMap::new(),
            decoder: Box::new(decoder),
            on_restored: None,
            ttl: None,
        }
    }

    /// Create a composer decoding with a record codec
    pub fn from_codec<C>(codec: Arc<C>) -> Self
    where
        C: RecordCodec<Record = T>,
    {
        Self::new(move |bytes, version| codec.decode(bytes, version))
    }

    /// Enable eviction of reassemblies older than `ttl` (see [`Self::evict_stale`])
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Register the restoration callback, replacing any previous one
    pub fn on_object_restored<F>(&mut self, callback: F)
    where
        F: FnMut(T) + Send + 'static,
    {
        self.on_restored = Some(Box::new(callback));
    }

    /// Number of incomplete messages held
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    /// Decode a raw datagram and store it
    ///
    /// # Errors
    /// - `MalformedFragment`: the datagram is dropped, other reassemblies are untouched
    /// - `Codec`: the message completed but could not be decoded; its buffer is dropped
    pub fn push_fragment(&mut self, datagram: Bytes) -> Result<FragmentStatus> {
        let envelope = Envelope::decode(datagram).inspect_err(|_| {
            metrics::record_fragment_malformed();
        })?;
        self.push_envelope(envelope)
    }

    /// Store an already decoded envelope
    ///
    /// # Errors
    /// See [`Self::push_fragment`]
    pub fn push_envelope(&mut self, envelope: Envelope) -> Result<FragmentStatus> {
        metrics::record_fragment_received();
        envelope.validate().inspect_err(|_| {
            metrics::record_fragment_malformed();
        })?;
        let id = envelope.correlation_id;

        let buffer = self
            .buffers
            .entry(id)
            .or_insert_with(|| Reassembly::new(envelope.count));

        if buffer.slots.len() != envelope.count as usize {
            metrics::record_fragment_malformed();
            return Err(TransportError::malformed(format!(
                "fragment count {} disagrees with {} for correlation id {id}",
                envelope.count,
                buffer.slots.len()
            )));
        }

        let sequence = envelope.sequence;
        let duplicate = buffer.insert(envelope);
        if duplicate {
            metrics::record_fragment_duplicate();
            debug!(correlation_id = %id, sequence, "Duplicate fragment overwritten");
        }

        if !buffer.is_complete() {
            metrics::record_reassembly_pending(self.buffers.len());
            return Ok(if duplicate {
                FragmentStatus::Duplicate
            } else {
                FragmentStatus::Buffered
            });
        }

        let Some(buffer) = self.buffers.remove(&id) else {
            return Ok(FragmentStatus::Buffered);
        };
        metrics::record_reassembly_pending(self.buffers.len());
        self.restore(id, buffer)?;
        Ok(FragmentStatus::Restored)
    }

    fn restore(&mut self, id: CorrelationId, buffer: Reassembly) -> Result<()> {
        let (payload, format) = buffer.assemble();
        let object = (self.decoder)(&payload, format)?;
        metrics::record_message_restored();
        trace!(correlation_id = %id, bytes = payload.len(), %format, "Message restored");

        match self.on_restored.as_mut() {
            Some(callback) => callback(object),
            None => warn!(correlation_id = %id, "No restoration callback registered, message dropped"),
        }
        Ok(())
    }

    /// Drop incomplete reassemblies older than the configured ttl
    ///
    /// Returns the number evicted; always zero when no ttl is set.
    pub fn evict_stale(&mut self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.buffers.len();
        self.buffers
            .retain(|_, buffer| buffer.first_seen.elapsed() < ttl);
        let evicted = before - self.buffers.len();
        if evicted > 0 {
            metrics::record_reassembly_evicted(evicted);
            metrics::record_reassembly_pending(self.buffers.len());
            debug!(evicted, remaining = self.buffers.len(), "Evicted stale reassemblies");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::PacketSplitter;
    use proptest::prelude::*;
    use std::num::NonZeroUsize;
    use std::sync::Mutex;

    fn raw_composer() -> (PacketComposer<Vec<u8>>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let restored = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&restored);
        let mut composer = PacketComposer::new(|bytes: &[u8], _| Ok(bytes.to_vec()));
        composer.on_object_restored(move |obj| sink.lock().unwrap().push(obj));
        (composer, restored)
    }

    fn envelopes(data: &[u8], size: usize) -> Vec<Envelope> {
        PacketSplitter::new(NonZeroUsize::new(size).unwrap())
            .split(Bytes::copy_from_slice(data), FormatVersion::BINCODE_V1)
            .unwrap()
            .iter()
            .collect()
    }

    #[test]
    fn test_out_of_order_scenario() {
        let (mut composer, restored) = raw_composer();
        let parts = envelopes(b" hello world", 5);

        for idx in [2, 0, 1] {
            composer.push_fragment(parts[idx].encode()).unwrap();
        }

        assert_eq!(restored.lock().unwrap().as_slice(), &[b" hello world".to_vec()]);
        assert_eq!(composer.pending(), 0);
    }

    #[test]
    fn test_partial_message_never_fires() {
        let (mut composer, restored) = raw_composer();
        let parts = envelopes(b"0123456789abcdef", 4);

        for part in &parts[..parts.len() - 1] {
            let status = composer.push_envelope(part.clone()).unwrap();
            assert_eq!(status, FragmentStatus::Buffered);
        }

        assert!(restored.lock().unwrap().is_empty());
        assert_eq!(composer.pending(), 1);
    }

    #[test]
    fn test_duplicate_before_completion() {
        let (mut composer, restored) = raw_composer();
        let parts = envelopes(b"abcdefgh", 3);

        composer.push_envelope(parts[0].clone()).unwrap();
        let status = composer.push_envelope(parts[0].clone()).unwrap();
        assert_eq!(status, FragmentStatus::Duplicate);
        composer.push_envelope(parts[1].clone()).unwrap();
        let status = composer.push_envelope(parts[2].clone()).unwrap();
        assert_eq!(status, FragmentStatus::Restored);

        assert_eq!(restored.lock().unwrap().as_slice(), &[b"abcdefgh".to_vec()]);
    }

    #[test]
    fn test_interleaved_messages() {
        let (mut composer, restored) = raw_composer();
        let a = envelopes(b"first message", 4);
        let b = envelopes(b"second one!", 3);

        let mut order = Vec::new();
        for i in 0..a.len().max(b.len()) {
            if let Some(e) = b.get(b.len().saturating_sub(i + 1)) {
                order.push(e.clone());
            }
            if let Some(e) = a.get(i) {
                order.push(e.clone());
            }
        }
        for envelope in order {
            composer.push_envelope(envelope).unwrap();
        }

        let mut got = restored.lock().unwrap().clone();
        got.sort();
        assert_eq!(got, vec![b"first message".to_vec(), b"second one!".to_vec()]);
    }

    #[test]
    fn test_malformed_does_not_disturb_others() {
        let (mut composer, restored) = raw_composer();
        let parts = envelopes(b"keep going", 5);

        composer.push_envelope(parts[0].clone()).unwrap();
        let err = composer
            .push_fragment(Bytes::from_static(b"short"))
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedFragment { .. }));

        let mut wrong_count = parts[1].clone();
        wrong_count.count = 7;
        assert!(composer.push_envelope(wrong_count).is_err());

        composer.push_envelope(parts[1].clone()).unwrap();
        assert_eq!(restored.lock().unwrap().as_slice(), &[b"keep going".to_vec()]);
    }

    #[test]
    fn test_invalid_header_envelope_rejected() {
        let (mut composer, restored) = raw_composer();
        let out_of_range = Envelope {
            correlation_id: CorrelationId::new(),
            sequence: 5,
            count: 2,
            format_version: FormatVersion::BINCODE_V1,
            payload: Bytes::from_static(b"x"),
        };
        let zero_count = Envelope {
            sequence: 0,
            count: 0,
            ..out_of_range.clone()
        };

        for envelope in [out_of_range, zero_count] {
            let err = composer.push_envelope(envelope).unwrap_err();
            assert!(matches!(err, TransportError::MalformedFragment { .. }));
        }
        assert_eq!(composer.pending(), 0);
        assert!(restored.lock().unwrap().is_empty());
    }

    #[test]
    fn test_callback_replaced() {
        let (mut composer, first) = raw_composer();
        let second = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&second);
        composer.on_object_restored(move |obj| sink.lock().unwrap().push(obj));

        composer
            .push_envelope(envelopes(b"x", 4).remove(0))
            .unwrap();

        assert!(first.lock().unwrap().is_empty());
        assert_eq!(second.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_decode_failure_drops_buffer() {
        let mut composer: PacketComposer<()> =
            PacketComposer::new(|_, v| Err(ContractError::UnsupportedFormat { version: v.0 }));
        let err = composer
            .push_envelope(envelopes(b"abc", 8).remove(0))
            .unwrap_err();
        assert!(matches!(err, TransportError::Codec(_)));
        assert_eq!(composer.pending(), 0);
    }

    #[test]
    fn test_evict_stale() {
        let (composer, _) = raw_composer();
        let mut composer = composer.with_ttl(Duration::ZERO);
        composer
            .push_envelope(envelopes(b"never finished", 4).remove(0))
            .unwrap();
        assert_eq!(composer.pending(), 1);
        assert_eq!(composer.evict_stale(), 1);
        assert_eq!(composer.pending(), 0);
    }

    #[test]
    fn test_no_eviction_without_ttl() {
        let (mut composer, _) = raw_composer();
        composer
            .push_envelope(envelopes(b"never finished", 4).remove(0))
            .unwrap();
        assert_eq!(composer.evict_stale(), 0);
        assert_eq!(composer.pending(), 1);
    }

    proptest! {
        #[test]
        fn prop_any_order_with_duplicates(
            data in proptest::collection::vec(any::<u8>(), 0..1024),
            size in 1usize..128,
            seed in any::<u64>(),
        ) {
            use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

            let (mut composer, restored) = raw_composer();
            let mut parts = envelopes(&data, size);
            let mut rng = StdRng::seed_from_u64(seed);
            parts.shuffle(&mut rng);

            // inject duplicates of every fragment except the one that completes the message
            let last = parts.pop().unwrap();
            let dups = parts.clone();
            for envelope in parts.into_iter().chain(dups) {
                composer.push_envelope(envelope).unwrap();
            }
            prop_assert!(restored.lock().unwrap().is_empty());
            composer.push_envelope(last).unwrap();

            let got = restored.lock().unwrap().clone();
            prop_assert_eq!(got, vec![data]);
        }
    }
}
