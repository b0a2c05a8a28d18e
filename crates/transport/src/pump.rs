//! ReceivePump - UDP receive loop decoupled from the consumer callback
//!
//! ```text
//! socket -> receive loop -> PacketComposer -> queue -> consumer loop -> callback
//! ```
//!
//! Lifecycle: `Created -> Running (start) -> Stopping (stop) -> Closed (dispose)`.

use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{unbounded, Receiver, Sender};
use bytes::Bytes;
use contracts::RecordCodec;
use futures::future::BoxFuture;
use futures::FutureExt;
use observability::metrics;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::composer::PacketComposer;
use crate::config::PumpConfig;
use crate::diagnostics::{DiagnosticSink, TracingDiagnostics, TransportFault};
use crate::error::{Result, TransportError};

/// Error type returned by consumer callbacks
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

const MIN_EVICTION_PERIOD: Duration = Duration::from_millis(10);

/// Pump lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Created,
    Running,
    Stopping,
    Closed,
}

enum Consumer<T> {
    Sync(Box<dyn FnMut(T) -> std::result::Result<(), CallbackError> + Send>),
    Async(Box<dyn FnMut(T) -> BoxFuture<'static, std::result::Result<(), CallbackError>> + Send>),
}

impl<T> Consumer<T> {
    async fn invoke(&mut self, record: T) -> Result<()> {
        let outcome = match self {
            Consumer::Sync(callback) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| callback(record)))
            }
            Consumer::Async(callback) => {
                let future = callback(record);
                AssertUnwindSafe(future).catch_unwind().await
            }
        };
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::callback_failure(e.to_string())),
            Err(panic) => Err(TransportError::callback_failure(format!(
                "panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Receive pump for one record type
pub struct ReceivePump<C: RecordCodec> {
    config: PumpConfig,
    codec: Arc<C>,
    socket: Option<UdpSocket>,
    local_addr: SocketAddr,
    diagnostics: Arc<dyn DiagnosticSink>,
    cancel: CancellationToken,
    state: PumpState,
    receive_task: Option<JoinHandle<()>>,
    consume_task: Option<JoinHandle<()>>,
}

impl<C: RecordCodec> ReceivePump<C> {
    /// Bind the UDP endpoint; loops do not run until `start`
    #[instrument(name = "receive_pump_bind", skip(config, codec), fields(addr = %config.bind_addr))]
    pub async fn bind(config: PumpConfig, codec: C) -> Result<Self> {
        let socket = UdpSocket::bind(config.bind_addr).await?;
        let local_addr = socket.local_addr()?;
        debug!(addr = %local_addr, "Receive pump bound");

        Ok(Self {
            config,
            codec: Arc::new(codec),
            socket: Some(socket),
            local_addr,
            diagnostics: Arc::new(TracingDiagnostics),
            cancel: CancellationToken::new(),
            state: PumpState::Created,
            receive_task: None,
            consume_task: None,
        })
    }

    /// Replace the diagnostic sink (before `start`)
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Start both loops with a synchronous callback
    ///
    /// # Errors
    /// `AlreadyStarted` unless the pump is freshly bound
    pub fn start<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut(C::Record) -> std::result::Result<(), CallbackError> + Send + 'static,
    {
        self.spawn_loops(Consumer::Sync(Box::new(callback)))
    }

    /// Start both loops with an asynchronous callback
    ///
    /// # Errors
    /// `AlreadyStarted` unless the pump is freshly bound
    pub fn start_async<F, Fut>(&mut self, mut callback: F) -> Result<()>
    where
        F: FnMut(C::Record) -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<(), CallbackError>> + Send + 'static,
    {
        self.spawn_loops(Consumer::Async(Box::new(move |record| {
            callback(record).boxed()
        })))
    }

    fn spawn_loops(&mut self, consumer: Consumer<C::Record>) -> Result<()> {
        if self.state != PumpState::Created {
            return Err(TransportError::AlreadyStarted);
        }
        let socket = self.socket.take().ok_or(TransportError::AlreadyStarted)?;

        let (tx, rx) = unbounded();
        let mut composer = PacketComposer::from_codec(Arc::clone(&self.codec));
        if let Some(ttl) = self.config.reassembly_ttl {
            composer = composer.with_ttl(ttl);
        }
        composer.on_object_restored(enqueue(tx));

        let receiver = ReceiveLoop {
            socket,
            composer,
            cancel: self.cancel.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
            buffer_size: self.config.recv_buffer_size,
            eviction: self
                .config
                .reassembly_ttl
                .map(|ttl| (ttl / 2).max(MIN_EVICTION_PERIOD)),
        };
        self.receive_task = Some(tokio::spawn(receiver.run()));
        self.consume_task = Some(tokio::spawn(consume_loop(
            rx,
            consumer,
            self.cancel.clone(),
            Arc::clone(&self.diagnostics),
        )));
        self.state = PumpState::Running;

        info!(addr = %self.local_addr, "Receive pump started");
        Ok(())
    }

    /// Signal both loops to exit; in-flight callbacks finish
    ///
    /// Idempotent once started.
    ///
    /// # Errors
    /// `NotStarted` if `start` was never called
    pub fn stop(&mut self) -> Result<()> {
        match self.state {
            PumpState::Created => Err(TransportError::NotStarted),
            PumpState::Running => {
                self.cancel.cancel();
                self.state = PumpState::Stopping;
                debug!(addr = %self.local_addr, "Receive pump stopping");
                Ok(())
            }
            PumpState::Stopping | PumpState::Closed => Ok(()),
        }
    }

    /// Close the socket and release the loops
    ///
    /// Waits up to `shutdown_timeout` for the loops, then aborts whatever is left.
    #[instrument(name = "receive_pump_dispose", skip(self), fields(addr = %self.local_addr))]
    pub async fn dispose(&mut self) {
        if self.state == PumpState::Closed {
            return;
        }
        self.cancel.cancel();
        self.socket = None;

        let timeout = self.config.shutdown_timeout;
        for task in [self.receive_task.take(), self.consume_task.take()]
            .into_iter()
            .flatten()
        {
            join_bounded(task, timeout).await;
        }

        self.state = PumpState::Closed;
        info!("Receive pump closed");
    }
}

impl<C: RecordCodec> Drop for ReceivePump<C> {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in [self.receive_task.take(), self.consume_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

async fn join_bounded(mut task: JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => warn!(error = ?e, "Pump task panicked"),
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "Pump task did not stop in time, aborting");
            task.abort();
        }
    }
}

fn enqueue<T: Send + 'static>(tx: Sender<T>) -> impl FnMut(T) + Send + 'static {
    move |record| {
        if tx.try_send(record).is_err() {
            debug!("Consumer queue closed, restored message dropped");
        }
    }
}

struct ReceiveLoop<T> {
    socket: UdpSocket,
    composer: PacketComposer<T>,
    cancel: CancellationToken,
    diagnostics: Arc<dyn DiagnosticSink>,
    buffer_size: usize,
    eviction: Option<Duration>,
}

impl<T: Send + 'static> ReceiveLoop<T> {
    async fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size];
        let mut eviction = self.eviction.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        debug!("Receive loop started");

        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tick(&mut eviction) => {
                    self.composer.evict_stale();
                    continue;
                }
                res = self.socket.recv_from(&mut buf) => res,
            };

            match received {
                Ok((len, source)) => {
                    let datagram = Bytes::copy_from_slice(&buf[..len]);
                    if let Err(error) = self.composer.push_fragment(datagram) {
                        self.diagnostics.report(TransportFault::Fragment {
                            source: Some(source),
                            error,
                        });
                    }
                }
                Err(_) if self.cancel.is_cancelled() => break,
                Err(error) => self.diagnostics.report(TransportFault::Socket { error }),
            }
        }

        debug!(pending = self.composer.pending(), "Receive loop stopped");
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn consume_loop<T: Send + 'static>(
    rx: Receiver<T>,
    mut consumer: Consumer<T>,
    cancel: CancellationToken,
    diagnostics: Arc<dyn DiagnosticSink>,
) {
    debug!("Consumer loop started");
    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Ok(record) => record,
                Err(_) => break,
            },
        };

        if let Err(error) = consumer.invoke(record).await {
            metrics::record_callback_failure();
            diagnostics.report(TransportFault::Callback { error });
        }
    }
    debug!(queued = rx.len(), "Consumer loop stopped");
}
