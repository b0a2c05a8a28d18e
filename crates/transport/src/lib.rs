//! # Transport
//!
//! Best-effort fragmented record transport over UDP.
//!
//! Responsibilities:
//! - Envelope wire format (fixed 24-byte header + payload)
//! - Sender-side splitting bounded by the maximum datagram size
//! - Receiver-side reassembly keyed by correlation id
//! - Receive pump decoupling the socket from slow consumers
//!
//! No acknowledgement, ordering or retry: consumers tolerate dropped, duplicated and
//! never-completed messages.

pub mod codec;
pub mod composer;
pub mod config;
pub mod diagnostics;
pub mod envelope;
pub mod error;
pub mod pump;
pub mod sender;
pub mod splitter;

pub use codec::{CriticalErrorCodec, LogEventCodec, SerdeCodec, WireFormat};
pub use composer::{FragmentStatus, PacketComposer};
pub use config::{PumpConfig, SenderConfig};
pub use diagnostics::{DiagnosticSink, TracingDiagnostics, TransportFault};
pub use envelope::{CorrelationId, Envelope};
pub use error::TransportError;
pub use pump::{CallbackError, PumpState, ReceivePump};
pub use sender::{CriticalErrorSender, LogSender, RecordSender};
pub use splitter::{Fragments, PacketSplitter};
