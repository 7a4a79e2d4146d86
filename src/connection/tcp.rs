use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::transport::{Transport, TransportResult, TransportStatus};

/// Size of a single socket read
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// How long `receive` waits before reporting "nothing yet"
const POLL_WINDOW: Duration = Duration::from_millis(100);

/// Plain TCP transport
pub struct TcpTransport {
    name: String,
    status: TransportStatus,
    stream: Option<TcpStream>,
    read_buffer: Vec<u8>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            name: "tcp".to_string(),
            status: TransportStatus::Disconnected,
            stream: None,
            read_buffer: vec![0u8; READ_BUFFER_SIZE],
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> TransportStatus {
        self.status
    }

    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> TransportResult<()> {
        self.name = format!("{}:{}", host, port);
        self.status = TransportStatus::Connecting;
        info!("Connecting to {}", self.name);

        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.status = TransportStatus::Error;
                warn!("Failed to connect to {}: {}", self.name, e);
                return Err(e.into());
            }
            Err(_) => {
                self.status = TransportStatus::Error;
                warn!("Connect to {} timed out after {:?}", self.name, timeout);
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.name),
                )
                .into());
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed on {}: {}", self.name, e);
        }

        self.stream = Some(stream);
        self.status = TransportStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> TransportResult<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing {}", self.name);
            let _ = stream.shutdown().await;
        }
        self.status = TransportStatus::Disconnected;
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> TransportResult<()> {
        let stream = self.stream.as_mut().ok_or("Not connected")?;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Option<Vec<u8>>> {
        let stream = self.stream.as_mut().ok_or("Not connected")?;

        match tokio::time::timeout(POLL_WINDOW, stream.read(&mut self.read_buffer)).await {
            Ok(Ok(0)) => {
                self.status = TransportStatus::Disconnected;
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server").into())
            }
            Ok(Ok(n)) => Ok(Some(self.read_buffer[..n].to_vec())),
            Ok(Err(e)) => {
                self.status = TransportStatus::Error;
                Err(e.into())
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"OK MPD 0.23.5\n").await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"status\n");
        });

        let mut transport = TcpTransport::new();
        transport
            .connect("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(transport.status(), TransportStatus::Connected);

        let mut received = Vec::new();
        while received.len() < 14 {
            if let Some(data) = transport.receive().await.unwrap() {
                received.extend_from_slice(&data);
            }
        }
        assert_eq!(received, b"OK MPD 0.23.5\n");

        transport.send(b"status\n").await.unwrap();
        server.await.unwrap();

        transport.disconnect().await.unwrap();
        assert_eq!(transport.status(), TransportStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let mut transport = TcpTransport::new();
        assert!(transport.send(b"status\n").await.is_err());
    }
}
