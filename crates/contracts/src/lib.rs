//! # Contracts
//!
//! Frozen interface contracts shared by the transport and dispatch crates.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Record Model
//! - A `LogEvent` is opaque to the core: routing metadata plus an already-serialized payload
//! - `CriticalError` is the plain-text record reported on the dedicated critical channel
//! - Wire payloads carry a `FormatVersion` so a receiver can decode older writers

mod blueprint;
mod codec;
mod error;
mod event;
mod handler;
mod level;

pub use blueprint::*;
pub use codec::*;
pub use error::*;
pub use event::*;
pub use handler::*;
pub use level::*;
