//! MPD client: one socket, one command queue, many cheap handles

pub mod albumart;
mod autoplay;
mod dispatcher;
mod library;
mod playback;
mod playlist;
mod queue;

pub use albumart::AlbumArt;

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::connection::{
    tcp_factory, Lifecycle, SocketConnection, SocketStats, TrafficStats, TransportFactory,
};
use crate::core::{Stats, Status};
use crate::error::{MpdError, Result};
use crate::playback::PlaybackSession;
use crate::protocol::{ProtocolVersion, Request, Response};
use crate::storage::{AutoplayRecord, AutoplayStore};
use dispatcher::{Control, Dispatcher, DispatcherConfig};
use queue::PendingCommand;

pub const DEFAULT_PORT: u16 = 6600;

const CONTROL_QUEUE_SIZE: usize = 64;
const EVENT_CAPACITY: usize = 64;

/// Notifications broadcast to every subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connecting,
    Connected,
    /// The connection came back on its own (reconnect or resume)
    InternalConnected,
    Disconnected,
    /// Result of a periodic status poll
    Status(Status),
    PauseResume(Lifecycle),
}

/// How to reach a server and how to behave once connected
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub status_interval: Duration,
    /// Queue ticks (500 ms each) before a written command times out
    pub command_timeout_ticks: u32,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub album_art_dir: PathBuf,
    pub use_now_playing_control: bool,
    /// Volume changes go to the attached session's device instead of the server
    pub use_device_volume: bool,
    /// Where "Play Now" records survive restarts; `None` keeps them in memory
    pub autoplay_store: Option<AutoplayStore>,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::from_settings(&Settings::default(), host, port)
    }

    pub fn from_settings(settings: &Settings, host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            status_interval: settings.status_interval(),
            command_timeout_ticks: settings.command_timeout_ticks,
            connect_timeout: settings.connect_timeout(),
            reconnect_delay: settings.reconnect_delay(),
            max_reconnect_attempts: settings.max_reconnect_attempts,
            album_art_dir: settings.album_art_dir(),
            use_now_playing_control: settings.use_now_playing_control,
            use_device_volume: settings.use_device_volume,
            autoplay_store: None,
        }
    }

    pub fn with_password(mut self, password: Option<String>) -> Self {
        self.password = password.filter(|p| !p.is_empty());
        self
    }

    pub fn with_autoplay_store(mut self, store: AutoplayStore) -> Self {
        self.autoplay_store = Some(store);
        self
    }
}

/// Per-connection state shared by all handles
#[derive(Debug, Default)]
struct ClientState {
    decoder_suffixes: Vec<String>,
    stats: Stats,
    autoplay: Option<AutoplayRecord>,
    /// A "Play Now" request is between its checks and its record
    autoplay_starting: bool,
    last_status: Option<Status>,
    current_playlist_name: Option<String>,
}

struct Inner {
    options: ClientOptions,
    factory: TransportFactory,
    events: broadcast::Sender<ClientEvent>,
    control: StdMutex<Option<mpsc::Sender<Control>>>,
    version: Arc<RwLock<ProtocolVersion>>,
    state: Mutex<ClientState>,
    session: StdMutex<Option<PlaybackSession>>,
    traffic: StdMutex<Option<Arc<SocketStats>>>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(tasks) = self.tasks.get_mut() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

/// Handle to an MPD server
///
/// Cloning is cheap and every clone drives the same connection. Commands
/// from all clones are serialized through one queue, so replies can never
/// be mixed up.
#[derive(Clone)]
pub struct MpdClient {
    inner: Arc<Inner>,
}

impl MpdClient {
    /// A TCP client; call `start` to connect
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(options, tcp_factory())
    }

    pub fn with_transport(options: ClientOptions, factory: TransportFactory) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                options,
                factory,
                events,
                control: StdMutex::new(None),
                version: Arc::new(RwLock::new(ProtocolVersion::default())),
                state: Mutex::new(ClientState::default()),
                session: StdMutex::new(None),
                traffic: StdMutex::new(None),
                tasks: StdMutex::new(Vec::new()),
            }),
        }
    }

    /// Create a TCP client and connect it
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let client = Self::new(options);
        client.start().await?;
        Ok(client)
    }

    fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Version from the server greeting (zero before connecting)
    pub fn version(&self) -> ProtocolVersion {
        self.inner
            .version
            .read()
            .map(|v| *v)
            .unwrap_or_default()
    }

    /// False once disconnected or after reconnects ran out
    pub fn is_connected(&self) -> bool {
        self.control_sender().is_some_and(|control| !control.is_closed())
    }

    fn control_sender(&self) -> Option<mpsc::Sender<Control>> {
        self.inner
            .control
            .lock()
            .ok()
            .and_then(|control| control.clone())
    }

    fn track(&self, task: JoinHandle<()>) {
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            tasks.push(task);
        }
    }

    /// Attach the host playback session; takes effect on the next `start`
    pub fn attach_session(&self, session: PlaybackSession) {
        if let Ok(mut slot) = self.inner.session.lock() {
            *slot = Some(session);
        }
    }

    /// Connect, greet, log in and load the per-server state
    pub async fn start(&self) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected");
            return Ok(());
        }
        self.emit(ClientEvent::Connecting);
        match self.open().await {
            Ok(()) => {
                self.emit(ClientEvent::Connected);
                Ok(())
            }
            Err(e) => {
                error!(
                    "Connecting to {}:{} failed: {}",
                    self.inner.options.host, self.inner.options.port, e
                );
                self.close().await;
                self.emit(ClientEvent::Disconnected);
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<()> {
        let options = &self.inner.options;
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let mut socket =
            SocketConnection::new(socket_tx, self.inner.factory.clone(), options.connect_timeout);
        if let Ok(mut traffic) = self.inner.traffic.lock() {
            *traffic = Some(socket.stats());
        }
        socket.connect(&options.host, options.port).await?;

        let (greeting_tx, greeting_rx) = oneshot::channel();
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE_SIZE);
        let dispatcher = Dispatcher::new(
            socket,
            socket_rx,
            control_rx,
            DispatcherConfig {
                timeout_ticks: options.command_timeout_ticks,
                reconnect_delay: options.reconnect_delay,
                max_reconnect_attempts: options.max_reconnect_attempts,
                password: options.password.clone(),
            },
            self.inner.events.clone(),
            self.inner.version.clone(),
            greeting_tx,
        );
        tokio::spawn(dispatcher.run());
        if let Ok(mut control) = self.inner.control.lock() {
            *control = Some(control_tx);
        }

        let version = tokio::time::timeout(options.connect_timeout, greeting_rx)
            .await
            .map_err(|_| MpdError::Timeout("Timeout waiting for server greeting".to_string()))?
            .map_err(|_| MpdError::ConnectionClosed)?;
        info!(
            "Connected to MPD {} at {}:{}",
            version, options.host, options.port
        );

        if let Some(password) = &options.password {
            self.login(password).await?;
        }
        self.load_decoder_suffixes().await?;
        self.stats().await?;
        self.load_autoplay_record().await;

        self.spawn_status_poller();
        self.start_session();
        Ok(())
    }

    /// Stop the dispatcher and background tasks
    async fn close(&self) {
        let control = self.inner.control.lock().ok().and_then(|mut c| c.take());
        if let Some(control) = control {
            let (done_tx, done_rx) = oneshot::channel();
            if control.send(Control::Shutdown(done_tx)).await.is_ok() {
                let _ = done_rx.await;
            }
        }
        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }

    pub async fn disconnect(&self) {
        self.close().await;
        self.stop_session();
        self.emit(ClientEvent::Disconnected);
        info!("Disconnected");
    }

    /// Close the socket, keeping the endpoint for `resume`
    pub async fn suspend(&self) -> Result<()> {
        let control = self.control_sender().ok_or(MpdError::NotConnected)?;
        let (done_tx, done_rx) = oneshot::channel();
        control
            .send(Control::Suspend(done_tx))
            .await
            .map_err(|_| MpdError::NotConnected)?;
        done_rx.await.map_err(|_| MpdError::ConnectionClosed)
    }

    pub async fn resume(&self) -> Result<()> {
        let control = self.control_sender().ok_or(MpdError::NotConnected)?;
        let (done_tx, done_rx) = oneshot::channel();
        control
            .send(Control::Resume(done_tx))
            .await
            .map_err(|_| MpdError::NotConnected)?;
        done_rx.await.map_err(|_| MpdError::ConnectionClosed)?
    }

    /// Queue a request and wait for its reply
    pub(crate) async fn execute(&self, request: impl Into<Request>) -> Result<Response> {
        let request = request.into();
        // a second line would get its own reply and shift every later one
        if let Some(command) = request.multiline_command() {
            return Err(MpdError::Protocol(format!(
                "line break in {} command",
                command.name()
            )));
        }
        let control = self.control_sender().ok_or(MpdError::NotConnected)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        control
            .send(Control::Send(PendingCommand::new(request, reply_tx)))
            .await
            .map_err(|_| MpdError::NotConnected)?;
        reply_rx.await.map_err(|_| MpdError::ConnectionClosed)?
    }

    pub(crate) async fn body(&self, request: impl Into<Request>) -> Result<String> {
        Ok(self.execute(request).await?.body)
    }

    pub(crate) async fn ok(&self, request: impl Into<Request>) -> Result<()> {
        self.execute(request).await.map(|_| ())
    }

    fn spawn_status_poller(&self) {
        let weak = self.downgrade();
        let interval = self.inner.options.status_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let client = MpdClient::from_inner(inner);
                match client.poll_status().await {
                    Ok(_) => {}
                    Err(MpdError::NotConnected) => break,
                    Err(e) => warn!("Status poll failed: {}", e),
                }
            }
            debug!("Status poller stopped");
        });
        self.track(task);
    }

    /// Fetch status, restore the queue if a "Play Now" song has ended, and
    /// broadcast the result
    pub async fn poll_status(&self) -> Result<Status> {
        // only a status requested after the record existed can end it
        let armed = self.autoplay_record().await;
        let mut status = self.status().await?;
        if let Some(record) = armed {
            if self.finish_autoplay_if_done(&record, &status).await {
                status.reload_queue = true;
            }
        }
        self.emit(ClientEvent::Status(status.clone()));
        Ok(status)
    }

    /// Socket counters of the current connection, kept across reconnects
    pub async fn traffic(&self) -> Option<TrafficStats> {
        let stats = self.inner.traffic.lock().ok().and_then(|t| t.clone())?;
        Some(stats.snapshot().await)
    }

    /// Status from the most recent `status` call
    pub async fn last_status(&self) -> Option<Status> {
        self.inner.state.lock().await.last_status.clone()
    }
}
