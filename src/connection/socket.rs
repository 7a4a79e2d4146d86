use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::transport::{is_timeout, Transport, TransportError};
use crate::error::{MpdError, Result};
use crate::protocol::{AckError, Frame, ProtocolVersion, Response, ResponseDecoder};

/// Queue depth for outgoing writes
const WRITE_QUEUE_SIZE: usize = 100;

/// Builds a fresh transport for every (re)connect
pub type TransportFactory = Arc<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Connection state reported to the event sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connected,
    /// Reconnected by the connection itself (resume, reconnect)
    InternalConnected,
    Disconnected,
}

/// App lifecycle notifications relayed by the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Paused,
    Resumed,
}

/// Everything the connection tells its owner
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Init(ProtocolVersion),
    Response(Response),
    ResponseError(AckError),
    Error(String),
    StateChange(SocketState),
    Timeout,
    PauseResume(Lifecycle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Default)]
pub struct SocketStats {
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub frames: AtomicU64,
    pub errors: AtomicU64,
    pub connected_at: Mutex<Option<DateTime<Utc>>>,
}

/// Copy of the counters at one point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub frames: u64,
    pub errors: u64,
    pub connected_at: Option<DateTime<Utc>>,
}

impl SocketStats {
    pub async fn snapshot(&self) -> TrafficStats {
        TrafficStats {
            bytes_received: self.bytes_received.load(Ordering::SeqCst),
            bytes_sent: self.bytes_sent.load(Ordering::SeqCst),
            frames: self.frames.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            connected_at: *self.connected_at.lock().await,
        }
    }
}

/// A socket to an MPD server that relays everything it sees to one event sink
///
/// The I/O runs on a spawned task. Outgoing bytes reach it over a channel
/// and decoded frames leave through the event sink, so the owner never
/// touches the stream directly.
pub struct SocketConnection {
    host: Option<String>,
    port: u16,
    /// Set when the current connection was opened by resume/reconnect
    internal_connect: bool,
    status: Arc<Mutex<ConnectionStatus>>,
    stats: Arc<SocketStats>,
    stop_signal: Arc<AtomicBool>,
    write_tx: Option<mpsc::Sender<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<SocketEvent>,
    factory: TransportFactory,
    connect_timeout: Duration,
}

impl SocketConnection {
    pub fn new(
        events: mpsc::UnboundedSender<SocketEvent>,
        factory: TransportFactory,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            host: None,
            port: 0,
            internal_connect: false,
            status: Arc::new(Mutex::new(ConnectionStatus::Disconnected)),
            stats: Arc::new(SocketStats::default()),
            stop_signal: Arc::new(AtomicBool::new(false)),
            write_tx: None,
            task: None,
            events,
            factory,
            connect_timeout,
        }
    }

    pub async fn status(&self) -> ConnectionStatus {
        *self.status.lock().await
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn internal_connect(&self) -> bool {
        self.internal_connect
    }

    /// Counters shared with the I/O task; they survive reconnects
    pub fn stats(&self) -> Arc<SocketStats> {
        self.stats.clone()
    }

    fn emit(&self, event: SocketEvent) {
        if self.events.send(event).is_err() {
            debug!("Socket event dropped, sink closed");
        }
    }

    /// Connect to `host:port`. A no-op when already connected.
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if matches!(
            self.status().await,
            ConnectionStatus::Connected | ConnectionStatus::Connecting
        ) {
            debug!("Already connected to {}:{}", host, port);
            return Ok(());
        }
        self.host = Some(host.to_string());
        self.port = port;
        self.internal_connect = false;
        self.open().await
    }

    /// Reconnect to the remembered endpoint after a `suspend`
    pub async fn resume(&mut self) -> Result<()> {
        if self.host.is_none() {
            return Err(MpdError::NotConnected);
        }
        self.emit(SocketEvent::PauseResume(Lifecycle::Resumed));
        self.reconnect().await
    }

    /// Reopen the remembered endpoint without a lifecycle notification
    pub async fn reconnect(&mut self) -> Result<()> {
        if self.host.is_none() {
            return Err(MpdError::NotConnected);
        }
        self.close().await;
        self.internal_connect = true;
        self.open().await
    }

    /// Close the socket but keep the endpoint for `resume`
    pub async fn suspend(&mut self) {
        self.emit(SocketEvent::PauseResume(Lifecycle::Paused));
        self.close().await;
    }

    /// Close the socket and forget the endpoint
    pub async fn disconnect(&mut self) {
        self.close().await;
        self.host = None;
        self.port = 0;
    }

    /// Queue bytes for the server
    pub async fn write(&self, data: Vec<u8>) -> Result<()> {
        let sender = self.write_tx.as_ref().ok_or(MpdError::NotConnected)?;
        sender.send(data).await.map_err(|_| MpdError::NotConnected)
    }

    async fn open(&mut self) -> Result<()> {
        let host = self.host.clone().ok_or(MpdError::NotConnected)?;
        let port = self.port;

        *self.status.lock().await = ConnectionStatus::Connecting;

        let mut transport = (self.factory)();
        if let Err(e) = transport.connect(&host, port, self.connect_timeout).await {
            *self.status.lock().await = ConnectionStatus::Error;
            self.stats.errors.fetch_add(1, Ordering::SeqCst);
            if is_timeout(&e) {
                warn!("Connect to {}:{} timed out", host, port);
                self.emit(SocketEvent::Timeout);
            } else {
                error!("Connect to {}:{} failed: {}", host, port, e);
            }
            return Err(into_mpd_error(e));
        }

        info!("Connected to {}:{} via {}", host, port, transport.name());
        *self.stats.connected_at.lock().await = Some(Utc::now());
        *self.status.lock().await = ConnectionStatus::Connected;

        // every connection gets its own stop flag so a late task cannot see a reset one
        let stop_signal = Arc::new(AtomicBool::new(false));
        self.stop_signal = stop_signal.clone();

        let (write_tx, write_rx) = mpsc::channel::<Vec<u8>>(WRITE_QUEUE_SIZE);
        self.write_tx = Some(write_tx);

        self.emit(SocketEvent::StateChange(if self.internal_connect {
            SocketState::InternalConnected
        } else {
            SocketState::Connected
        }));

        self.task = Some(tokio::spawn(Self::run(
            transport,
            write_rx,
            self.events.clone(),
            self.status.clone(),
            self.stats.clone(),
            stop_signal,
        )));
        Ok(())
    }

    async fn close(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        self.write_tx = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Socket task ended abnormally: {}", e);
            }
        }
        *self.status.lock().await = ConnectionStatus::Disconnected;
    }

    async fn run(
        mut transport: Box<dyn Transport>,
        mut write_rx: mpsc::Receiver<Vec<u8>>,
        events: mpsc::UnboundedSender<SocketEvent>,
        status: Arc<Mutex<ConnectionStatus>>,
        stats: Arc<SocketStats>,
        stop_signal: Arc<AtomicBool>,
    ) {
        let mut decoder = ResponseDecoder::new();
        let mut failure: Option<String> = None;

        loop {
            if stop_signal.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                outgoing = write_rx.recv() => match outgoing {
                    Some(data) => {
                        if let Err(e) = transport.send(&data).await {
                            stats.errors.fetch_add(1, Ordering::SeqCst);
                            failure = Some(format!("Write failed: {}", e));
                            break;
                        }
                        stats.bytes_sent.fetch_add(data.len() as u64, Ordering::SeqCst);
                    }
                    None => break,
                },
                incoming = transport.receive() => match incoming {
                    Ok(Some(data)) => {
                        stats.bytes_received.fetch_add(data.len() as u64, Ordering::SeqCst);
                        decoder.push(&data);
                        if let Err(e) = Self::relay_frames(&mut decoder, &events, &stats) {
                            stats.errors.fetch_add(1, Ordering::SeqCst);
                            warn!("Dropping undecodable input: {}", e);
                            let _ = events.send(SocketEvent::Error(e));
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        stats.errors.fetch_add(1, Ordering::SeqCst);
                        failure = Some(e.to_string());
                        break;
                    }
                },
            }
        }

        let _ = transport.disconnect().await;

        // a deliberate close already updated the status; only report failures
        if let Some(message) = failure {
            if !stop_signal.load(Ordering::SeqCst) {
                error!("Connection lost: {}", message);
                *status.lock().await = ConnectionStatus::Disconnected;
                let _ = events.send(SocketEvent::Error(message));
                let _ = events.send(SocketEvent::StateChange(SocketState::Disconnected));
            }
        }
    }

    fn relay_frames(
        decoder: &mut ResponseDecoder,
        events: &mpsc::UnboundedSender<SocketEvent>,
        stats: &SocketStats,
    ) -> std::result::Result<(), String> {
        while let Some(frame) = decoder.next_frame()? {
            stats.frames.fetch_add(1, Ordering::SeqCst);
            let event = match frame {
                Frame::Greeting(version) => {
                    info!("Server speaks protocol {}", version);
                    SocketEvent::Init(version)
                }
                Frame::Response(response) => SocketEvent::Response(response),
                Frame::Error(ack) => {
                    debug!("Server error: {}", ack);
                    SocketEvent::ResponseError(ack)
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
        Ok(())
    }
}

fn into_mpd_error(err: TransportError) -> MpdError {
    match err.downcast::<std::io::Error>() {
        Ok(io) => MpdError::Io(*io),
        Err(other) => MpdError::Io(std::io::Error::other(other.to_string())),
    }
}
