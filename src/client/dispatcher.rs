use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::queue::{CommandQueue, PendingCommand, TaskState};
use super::ClientEvent;
use crate::connection::{SocketConnection, SocketEvent, SocketState};
use crate::error::{MpdError, Result};
use crate::protocol::{Command, ProtocolVersion};

/// Queue tick; the command timeout is counted in these
pub(crate) const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Requests from client handles to the dispatcher task
pub(crate) enum Control {
    Send(PendingCommand),
    Suspend(oneshot::Sender<()>),
    Resume(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<()>),
}

pub(crate) struct DispatcherConfig {
    pub timeout_ticks: u32,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub password: Option<String>,
}

/// Owns the socket and the command queue
///
/// Runs as one task. Commands arrive over the control channel, replies
/// and connection changes over the socket's event channel, and only the
/// queue head is ever on the wire.
pub(crate) struct Dispatcher {
    socket: SocketConnection,
    socket_events: mpsc::UnboundedReceiver<SocketEvent>,
    control: mpsc::Receiver<Control>,
    queue: CommandQueue,
    config: DispatcherConfig,
    events: broadcast::Sender<ClientEvent>,
    version: Arc<RwLock<ProtocolVersion>>,
    greeting: Option<oneshot::Sender<ProtocolVersion>>,
    connected: bool,
    reconnect_at: Option<Instant>,
    reconnect_attempts: u32,
    /// Reconnects ran out; the task winds down after the current event
    gave_up: bool,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: SocketConnection,
        socket_events: mpsc::UnboundedReceiver<SocketEvent>,
        control: mpsc::Receiver<Control>,
        config: DispatcherConfig,
        events: broadcast::Sender<ClientEvent>,
        version: Arc<RwLock<ProtocolVersion>>,
        greeting: oneshot::Sender<ProtocolVersion>,
    ) -> Self {
        Self {
            socket,
            socket_events,
            control,
            queue: CommandQueue::new(config.timeout_ticks),
            config,
            events,
            version,
            greeting: Some(greeting),
            connected: false,
            reconnect_at: None,
            reconnect_attempts: 0,
            gave_up: false,
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = self.control.recv() => match message {
                    Some(Control::Send(command)) => self.queue.push(command),
                    Some(Control::Suspend(done)) => {
                        self.suspend().await;
                        let _ = done.send(());
                    }
                    Some(Control::Resume(done)) => {
                        let result = self.socket.resume().await;
                        let _ = done.send(result);
                    }
                    Some(Control::Shutdown(done)) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        // every handle is gone
                        self.shutdown().await;
                        return;
                    }
                },
                Some(event) = self.socket_events.recv() => self.handle_socket_event(event),
                _ = ticker.tick() => self.on_tick().await,
            }

            if self.gave_up {
                self.give_up().await;
                return;
            }
            self.pump().await;
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Init(version) => {
                if let Ok(mut current) = self.version.write() {
                    *current = version;
                }
                if let Some(greeting) = self.greeting.take() {
                    let _ = greeting.send(version);
                }
            }
            SocketEvent::Response(response) => {
                if !self.queue.complete(Ok(response)) {
                    warn!("Dropping response with no command waiting");
                }
            }
            SocketEvent::ResponseError(ack) => {
                debug!("Command failed: {}", ack);
                if !self.queue.complete(Err(MpdError::Ack(ack))) {
                    warn!("Dropping error with no command waiting");
                }
            }
            SocketEvent::Error(message) => {
                self.queue.fail_written(|| MpdError::Protocol(message));
            }
            SocketEvent::StateChange(SocketState::Connected) => {
                self.connected = true;
            }
            SocketEvent::StateChange(SocketState::InternalConnected) => {
                info!("Reconnected");
                self.connected = true;
                self.reconnect_at = None;
                self.reconnect_attempts = 0;
                if let Some(password) = &self.config.password {
                    self.queue.push_front(PendingCommand::detached(
                        Command::new("password").quoted(password).into(),
                    ));
                }
                self.emit(ClientEvent::InternalConnected);
            }
            SocketEvent::StateChange(SocketState::Disconnected) => {
                self.connected = false;
                self.queue.fail_written(|| MpdError::ConnectionClosed);
                self.emit(ClientEvent::Disconnected);
                self.schedule_reconnect();
            }
            SocketEvent::Timeout => warn!("Connect timed out"),
            SocketEvent::PauseResume(lifecycle) => self.emit(ClientEvent::PauseResume(lifecycle)),
        }
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            error!(
                "Giving up after {} reconnect attempts",
                self.reconnect_attempts
            );
            self.reconnect_at = None;
            self.gave_up = true;
            self.queue.fail_all(|| MpdError::NotConnected);
            return;
        }
        self.reconnect_at = Some(Instant::now() + self.config.reconnect_delay);
    }

    async fn on_tick(&mut self) {
        if let Some(label) = self.queue.tick() {
            warn!("Timeout on {}", label);
        }

        let due = matches!(self.reconnect_at, Some(at) if Instant::now() >= at);
        if !due {
            return;
        }
        self.reconnect_attempts += 1;
        info!(
            "Reconnecting (attempt {}/{})",
            self.reconnect_attempts, self.config.max_reconnect_attempts
        );
        match self.socket.reconnect().await {
            // InternalConnected follows on the event channel
            Ok(()) => self.reconnect_at = None,
            Err(e) => {
                warn!("Reconnect failed: {}", e);
                self.schedule_reconnect();
            }
        }
    }

    /// Write the head if it is waiting and the socket is up
    async fn pump(&mut self) {
        if !self.connected {
            return;
        }
        let wire = match self.queue.next_to_write() {
            Some(head) => {
                head.mark_written();
                debug!("> {}", head.request.label());
                head.request.to_wire()
            }
            None => return,
        };
        if let Err(e) = self.socket.write(wire.into_bytes()).await {
            warn!("Write failed: {}", e);
            self.queue.fail_written(|| e);
        }
    }

    async fn suspend(&mut self) {
        self.socket.suspend().await;
        self.connected = false;
        self.reconnect_at = None;
        self.queue.fail_written(|| MpdError::ConnectionClosed);
    }

    async fn shutdown(&mut self) {
        self.socket.disconnect().await;
        self.connected = false;
        self.reconnect_at = None;
        self.queue.fail_all(|| MpdError::NotConnected);
        debug!("Dispatcher stopped");
    }

    /// Stop taking requests: close the control channel and answer
    /// whatever is still buffered in it
    async fn give_up(&mut self) {
        self.shutdown().await;
        self.control.close();
        while let Some(message) = self.control.recv().await {
            match message {
                Control::Send(command) => command.fail(MpdError::NotConnected),
                Control::Suspend(done) | Control::Shutdown(done) => {
                    let _ = done.send(());
                }
                Control::Resume(done) => {
                    let _ = done.send(Err(MpdError::NotConnected));
                }
            }
        }
    }

    #[cfg(test)]
    fn head_state(&self) -> Option<TaskState> {
        self.queue.head_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{mock_factory, MockTransport};

    fn dispatcher(mock: &MockTransport) -> (Dispatcher, oneshot::Receiver<ProtocolVersion>) {
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (_control_tx, control_rx) = mpsc::channel(8);
        let (events, _) = broadcast::channel(8);
        let (greeting_tx, greeting_rx) = oneshot::channel();
        let socket = SocketConnection::new(socket_tx, mock_factory(mock), Duration::from_secs(1));
        let config = DispatcherConfig {
            timeout_ticks: 2,
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 0,
            password: Some("secret".to_string()),
        };
        let d = Dispatcher::new(
            socket,
            socket_rx,
            control_rx,
            config,
            events,
            Arc::new(RwLock::new(ProtocolVersion::default())),
            greeting_tx,
        );
        (d, greeting_rx)
    }

    #[tokio::test]
    async fn test_greeting_sets_version() {
        let mock = MockTransport::new();
        mock.set_version("0.21.4");
        let (mut d, greeting) = dispatcher(&mock);

        d.handle_socket_event(SocketEvent::Init(ProtocolVersion::new(0, 21, 4)));
        assert_eq!(greeting.await.unwrap(), ProtocolVersion::new(0, 21, 4));
        assert_eq!(*d.version.read().unwrap(), ProtocolVersion::new(0, 21, 4));
    }

    #[tokio::test]
    async fn test_internal_connect_queues_silent_login() {
        let mock = MockTransport::new();
        let (mut d, _greeting) = dispatcher(&mock);
        let mut events = d.events.subscribe();

        d.handle_socket_event(SocketEvent::StateChange(SocketState::InternalConnected));
        assert!(d.connected);
        assert_eq!(d.head_state(), Some(TaskState::Initial));
        assert_eq!(
            d.queue.next_to_write().unwrap().request.label(),
            "password \"secret\""
        );
        assert_eq!(events.recv().await.unwrap(), ClientEvent::InternalConnected);
    }

    #[tokio::test]
    async fn test_disconnect_without_retries_fails_everything() {
        let mock = MockTransport::new();
        let (mut d, _greeting) = dispatcher(&mock);
        let (tx, rx) = oneshot::channel();
        d.queue.push(PendingCommand::new(Command::new("status").into(), tx));
        d.connected = true;

        d.handle_socket_event(SocketEvent::StateChange(SocketState::Disconnected));
        assert!(!d.connected);
        assert!(d.reconnect_at.is_none());
        assert!(d.gave_up);
        assert!(matches!(rx.await.unwrap(), Err(MpdError::NotConnected)));
    }

    #[tokio::test]
    async fn test_give_up_answers_buffered_requests() {
        let mock = MockTransport::new();
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(8);
        let (events, _) = broadcast::channel(8);
        let (greeting_tx, _greeting_rx) = oneshot::channel();
        let socket = SocketConnection::new(socket_tx, mock_factory(&mock), Duration::from_secs(1));
        let config = DispatcherConfig {
            timeout_ticks: 2,
            reconnect_delay: Duration::from_millis(10),
            max_reconnect_attempts: 0,
            password: None,
        };
        let mut d = Dispatcher::new(
            socket,
            socket_rx,
            control_rx,
            config,
            events,
            Arc::new(RwLock::new(ProtocolVersion::default())),
            greeting_tx,
        );

        let (tx, rx) = oneshot::channel();
        control_tx
            .send(Control::Send(PendingCommand::new(Command::new("stats").into(), tx)))
            .await
            .unwrap();
        d.handle_socket_event(SocketEvent::StateChange(SocketState::Disconnected));
        d.give_up().await;

        assert!(matches!(rx.await.unwrap(), Err(MpdError::NotConnected)));
        assert!(control_tx.is_closed());
    }
}
