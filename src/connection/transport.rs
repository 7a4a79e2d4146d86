use async_trait::async_trait;
use std::error::Error;
use std::time::Duration;

/// Error type for transport operations
pub type TransportError = Box<dyn Error + Send + Sync>;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Status of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// One bidirectional byte stream to a server
///
/// Implemented by:
/// - `TcpTransport` for real servers
/// - `MockTransport`, a scripted server used in tests
#[async_trait]
pub trait Transport: Send {
    /// Name of this transport, for logs
    fn name(&self) -> &str;

    fn status(&self) -> TransportStatus;

    /// Open the stream, giving up after `timeout`
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> TransportResult<()>;

    async fn disconnect(&mut self) -> TransportResult<()>;

    /// Write all bytes
    async fn send(&mut self, data: &[u8]) -> TransportResult<()>;

    /// Read whatever arrived within the poll window
    ///
    /// Returns `None` when nothing arrived. A closed stream is an error.
    /// Must be cancel safe: dropping the future loses no data.
    async fn receive(&mut self) -> TransportResult<Option<Vec<u8>>>;
}

/// True when the error is an I/O timeout
pub fn is_timeout(err: &TransportError) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == std::io::ErrorKind::TimedOut)
}
