//! RecordSender - fire-and-forget fragmented UDP sender

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use contracts::{CriticalError, LogEvent, RecordCodec, TransportSettings};
use observability::metrics;
use tokio::net::UdpSocket;
use tracing::{debug, error, instrument, trace};

use crate::codec::{CriticalErrorCodec, LogEventCodec};
use crate::config::SenderConfig;
use crate::error::{Result, TransportError};
use crate::splitter::PacketSplitter;

/// Serializes records, fragments them and sends each fragment as one datagram
///
/// No acknowledgement, no retry: loss is accepted.
pub struct RecordSender<C: RecordCodec> {
    name: String,
    codec: C,
    splitter: PacketSplitter,
    destination: SocketAddr,
    socket: Option<UdpSocket>,
}

impl<C: RecordCodec> RecordSender<C> {
    /// Bind an ephemeral local socket aimed at `config.destination`
    #[instrument(name = "record_sender_bind", skip(name, config, codec), fields(target = %config.destination))]
    pub async fn bind(name: impl Into<String>, config: SenderConfig, codec: C) -> Result<Self> {
        let name = name.into();
        let splitter = PacketSplitter::for_datagram_size(config.max_datagram_size)?;

        let local = if config.destination.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local).await?;
        if config.broadcast {
            socket.set_broadcast(true)?;
        }

        debug!(
            sender = %name,
            target = %config.destination,
            max_fragment = splitter.max_fragment_size(),
            "Record sender ready"
        );

        Ok(Self {
            name,
            codec,
            splitter,
            destination: config.destination,
            socket: Some(socket),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket.as_ref().ok_or(TransportError::SocketClosed)
    }

    /// Send one record, returns the number of fragments emitted
    ///
    /// # Errors
    /// - `Codec`: the record could not be serialized (nothing sent)
    /// - `SocketClosed`: the sender was closed
    ///
    /// Datagram send failures are logged and counted, not returned.
    pub async fn send(&self, record: &C::Record) -> Result<usize> {
        let socket = self.socket()?;
        let payload = self.codec.encode(record)?;
        let plan = self.splitter.split(payload, self.codec.format_version())?;

        let mut sent = 0;
        for envelope in &plan {
            let datagram = envelope.encode();
            match socket.send_to(&datagram, self.destination).await {
                Ok(bytes) => {
                    sent += 1;
                    trace!(sender = %self.name, sequence = envelope.sequence, bytes, "Fragment sent");
                }
                Err(e) => {
                    // UDP is best-effort
                    error!(sender = %self.name, error = %e, "UDP send failed");
                }
            }
        }

        metrics::record_fragments_sent(&self.name, sent);
        debug!(
            sender = %self.name,
            correlation_id = %plan.correlation_id(),
            fragments = plan.count(),
            sent,
            "Record sent"
        );
        Ok(sent)
    }

    /// Release the socket; later sends fail with `SocketClosed`
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!(sender = %self.name, "Record sender closed");
        }
    }
}

/// Sender for ordinary log records
pub type LogSender = RecordSender<LogEventCodec>;

/// Sender for critical errors raised inside the logging subsystem
pub type CriticalErrorSender = RecordSender<CriticalErrorCodec>;

impl RecordSender<LogEventCodec> {
    /// Log sender on the blueprint's log port
    pub async fn from_settings(settings: &TransportSettings) -> Result<Self> {
        let config = SenderConfig::from_settings(settings, settings.log_port)?;
        let codec = LogEventCodec::new(config.format);
        Self::bind("log", config, codec).await
    }

    pub async fn send_event(&self, event: &LogEvent) -> Result<usize> {
        self.send(event).await
    }
}

impl RecordSender<CriticalErrorCodec> {
    /// Critical-error sender on the blueprint's critical-error port
    pub async fn from_settings(settings: &TransportSettings) -> Result<Self> {
        let config = SenderConfig::from_settings(settings, settings.critical_error_port)?;
        let codec = CriticalErrorCodec::new(config.format);
        Self::bind("critical_error", config, codec).await
    }

    /// Report a failure of the logging subsystem
    pub async fn report(&self, monitor_id: Option<String>, message: impl Into<String>) -> Result<usize> {
        self.send(&CriticalError::new(monitor_id, message)).await
    }
}
