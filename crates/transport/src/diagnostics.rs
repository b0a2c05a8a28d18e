//! Diagnostic channel for internal transport faults
//!
//! Faults never travel through the application pipeline, so a failing pipeline cannot
//! swallow its own diagnostics.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::TransportError;

/// Internal fault observed by a pump
#[derive(Debug)]
pub enum TransportFault {
    /// Datagram dropped by the composer
    Fragment {
        source: Option<SocketAddr>,
        error: TransportError,
    },
    /// Consumer callback returned an error or panicked
    Callback { error: TransportError },
    /// Unexpected socket error (not the shutdown condition)
    Socket { error: std::io::Error },
}

/// Receiver of transport faults
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, fault: TransportFault);
}

/// Default sink: reports through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn report(&self, fault: TransportFault) {
        match fault {
            TransportFault::Fragment { source, error } => {
                warn!(source = ?source, error = %error, "Fragment dropped");
            }
            TransportFault::Callback { error } => {
                error!(error = %error, "Consumer callback failed");
            }
            TransportFault::Socket { error } => {
                error!(error = %error, "Socket receive failed");
            }
        }
    }
}

impl<D: DiagnosticSink + ?Sized> DiagnosticSink for Arc<D> {
    fn report(&self, fault: TransportFault) {
        (**self).report(fault);
    }
}
