//! NetworkSink - forwards events to a remote receive pump

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use contracts::{ChannelOptions, ContractError, Handler, LeafConfig, LogEvent, LogLevel};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use transport::{LogEventCodec, LogSender, SenderConfig, WireFormat};

/// Configuration for NetworkSink
#[derive(Debug, Clone)]
pub struct NetworkSinkConfig {
    /// Target address
    pub addr: SocketAddr,
    /// Serialization format
    pub format: WireFormat,
    /// Max datagram size, envelope header included
    pub max_datagram_size: usize,
    /// Enable SO_BROADCAST
    pub broadcast: bool,
}

impl NetworkSinkConfig {
    /// Create config from params map
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, String> {
        let addr_str = params
            .get("addr")
            .ok_or_else(|| "missing 'addr' parameter".to_string())?;

        let addr: SocketAddr = addr_str
            .parse()
            .map_err(|e| format!("invalid address '{}': {}", addr_str, e))?;

        let format = match params.get("format").map(String::as_str) {
            Some("bincode") | None => WireFormat::Bincode,
            Some("json") => WireFormat::Json,
            Some(other) => return Err(format!("unknown format '{}'", other)),
        };

        let max_datagram_size = match params.get("max_datagram_size") {
            Some(s) => s
                .parse()
                .map_err(|e| format!("invalid max_datagram_size '{}': {}", s, e))?,
            None => SenderConfig::new(addr).max_datagram_size,
        };

        let broadcast = params
            .get("broadcast")
            .is_some_and(|v| matches!(v.as_str(), "true" | "1" | "yes"));

        Ok(Self {
            addr,
            format,
            max_datagram_size,
            broadcast,
        })
    }

    fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            destination: self.addr,
            max_datagram_size: self.max_datagram_size,
            broadcast: self.broadcast,
            format: self.format,
        }
    }
}

/// Sink that sends events over UDP through a fragmenting `LogSender`
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    minimal_filter: Option<LogLevel>,
    sender: RwLock<Option<LogSender>>,
}

impl NetworkSink {
    /// Create a new NetworkSink (the socket is bound by `initialize`)
    pub fn new(name: impl Into<String>, config: NetworkSinkConfig) -> Self {
        Self {
            name: name.into(),
            config,
            minimal_filter: None,
            sender: RwLock::new(None),
        }
    }

    /// Create from leaf configuration (for registry)
    pub fn from_config(config: &LeafConfig) -> Result<Self, ContractError> {
        let network = NetworkSinkConfig::from_params(&config.params)
            .map_err(|e| ContractError::handler_init(&config.name, e))?;
        let mut sink = Self::new(&config.name, network);
        sink.minimal_filter = config.minimal_filter;
        Ok(sink)
    }
}

#[async_trait]
impl Handler for NetworkSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimal_filter(&self) -> Option<LogLevel> {
        self.minimal_filter
    }

    #[instrument(name = "network_sink_initialize", skip(self, options), fields(sink = %self.name))]
    async fn initialize(&self, options: &ChannelOptions) -> Result<(), ContractError> {
        let codec = LogEventCodec::new(self.config.format);
        let sender = LogSender::bind(&self.name, self.config.sender_config(), codec)
            .await
            .map_err(|e| ContractError::handler_init(&self.name, e.to_string()))?;
        *self.sender.write().await = Some(sender);
        options.set_minimal_filter(self.minimal_filter);

        debug!(sink = %self.name, target = %self.config.addr, "NetworkSink connected");
        Ok(())
    }

    #[instrument(
        name = "network_sink_handle",
        skip(self, event),
        fields(sink = %self.name, monitor = %event.monitor_id)
    )]
    async fn handle(&self, event: &LogEvent, _parallel: bool) -> Result<(), ContractError> {
        let guard = self.sender.read().await;
        let sender = guard
            .as_ref()
            .ok_or_else(|| ContractError::handler_not_open(&self.name))?;

        // Datagram loss is logged by the sender; only encode failures surface here
        sender
            .send_event(event)
            .await
            .map(|_| ())
            .map_err(|e| ContractError::handler_write(&self.name, e.to_string()))
    }

    #[instrument(name = "network_sink_close", skip(self))]
    async fn close(&self) -> Result<(), ContractError> {
        if let Some(mut sender) = self.sender.write().await.take() {
            sender.close();
        }
        debug!(sink = %self.name, "NetworkSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;
    use tokio::net::UdpSocket;
    use transport::{Envelope, PacketComposer};

    #[test]
    fn test_network_sink_config_parsing() {
        let mut params = HashMap::new();
        params.insert("addr".to_string(), "127.0.0.1:9999".to_string());
        params.insert("format".to_string(), "json".to_string());

        let config = NetworkSinkConfig::from_params(&params).unwrap();
        assert_eq!(config.addr.port(), 9999);
        assert_eq!(config.format, WireFormat::Json);
        assert_eq!(config.max_datagram_size, 1280);
    }

    #[test]
    fn test_network_sink_config_errors() {
        assert!(NetworkSinkConfig::from_params(&HashMap::new()).is_err());

        let mut params = HashMap::new();
        params.insert("addr".to_string(), "127.0.0.1:9999".to_string());
        params.insert("format".to_string(), "xml".to_string());
        assert!(NetworkSinkConfig::from_params(&params).is_err());
    }

    #[tokio::test]
    async fn test_network_sink_forwards_event() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = LeafConfig::new("net", "network")
            .with_param("addr", socket.local_addr().unwrap().to_string());

        let sink = NetworkSink::from_config(&config).unwrap();
        sink.initialize(&ChannelOptions::new()).await.unwrap();

        let event = LogEvent::new("remote", LogLevel::Warning, "over the wire");
        sink.handle(&event, false).await.unwrap();

        let mut composer = PacketComposer::from_codec(Arc::new(LogEventCodec::default()));
        let restored = Arc::new(std::sync::Mutex::new(None));
        let slot = Arc::clone(&restored);
        composer.on_object_restored(move |e| *slot.lock().unwrap() = Some(e));

        let mut buf = vec![0u8; 2048];
        let (len, _) = socket.recv_from(&mut buf).await.unwrap();
        let envelope = Envelope::decode(Bytes::copy_from_slice(&buf[..len])).unwrap();
        composer.push_envelope(envelope).unwrap();
        assert_eq!(restored.lock().unwrap().as_ref(), Some(&event));

        sink.close().await.unwrap();
        assert!(sink.handle(&event, false).await.is_err());
    }
}
