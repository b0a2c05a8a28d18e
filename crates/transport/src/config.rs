//! Pump and sender configuration

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use contracts::{TransportSettings, MAX_UDP_DATAGRAM};

use crate::codec::WireFormat;
use crate::error::{Result, TransportError};

/// Receive pump configuration
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Local address to bind
    pub bind_addr: SocketAddr,
    /// Receive buffer size (largest datagram accepted)
    pub recv_buffer_size: usize,
    /// Upper bound on waiting for the loops in `dispose`
    pub shutdown_timeout: Duration,
    /// Evict incomplete messages older than this
    pub reassembly_ttl: Option<Duration>,
}

impl PumpConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            recv_buffer_size: MAX_UDP_DATAGRAM,
            shutdown_timeout: Duration::from_secs(2),
            reassembly_ttl: None,
        }
    }

    /// Build from blueprint settings for the given port
    pub fn from_settings(settings: &TransportSettings, port: u16) -> Result<Self> {
        Ok(Self {
            bind_addr: socket_addr(&settings.bind_host, port)?,
            recv_buffer_size: MAX_UDP_DATAGRAM,
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
            reassembly_ttl: settings.reassembly_ttl_ms.map(Duration::from_millis),
        })
    }
}

/// Record sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Destination (unicast or broadcast)
    pub destination: SocketAddr,
    /// Maximum datagram size including the envelope header
    pub max_datagram_size: usize,
    /// Enable SO_BROADCAST
    pub broadcast: bool,
    /// Serialization format for outgoing payloads
    pub format: WireFormat,
}

impl SenderConfig {
    pub fn new(destination: SocketAddr) -> Self {
        Self {
            destination,
            max_datagram_size: TransportSettings::default().max_datagram_size,
            broadcast: false,
            format: WireFormat::default(),
        }
    }

    /// Build from blueprint settings for the given port
    pub fn from_settings(settings: &TransportSettings, port: u16) -> Result<Self> {
        Ok(Self {
            destination: socket_addr(&settings.destination_host, port)?,
            max_datagram_size: settings.max_datagram_size,
            broadcast: settings.broadcast,
            format: WireFormat::default(),
        })
    }
}

fn socket_addr(host: &str, port: u16) -> Result<SocketAddr> {
    let ip = if host == "localhost" {
        IpAddr::from([127, 0, 0, 1])
    } else {
        host.parse::<IpAddr>()
            .map_err(|e| TransportError::invalid_config(format!("invalid host '{host}': {e}")))?
    };
    Ok(SocketAddr::new(ip, port))
}
