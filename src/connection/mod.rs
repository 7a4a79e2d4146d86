pub mod mock;
pub mod socket;
pub mod tcp;
pub mod transport;

pub use mock::{MockReply, MockTransport};
pub use socket::{
    ConnectionStatus, Lifecycle, SocketConnection, SocketEvent, SocketState, SocketStats,
    TrafficStats, TransportFactory,
};
pub use tcp::TcpTransport;
pub use transport::{Transport, TransportResult, TransportStatus};

use std::sync::Arc;

/// Factory producing TCP transports
pub fn tcp_factory() -> TransportFactory {
    Arc::new(|| -> Box<dyn Transport> { Box::new(TcpTransport::new()) })
}

/// Factory producing clones of one scripted server
pub fn mock_factory(mock: &MockTransport) -> TransportFactory {
    let template = mock.clone();
    Arc::new(move || -> Box<dyn Transport> { Box::new(template.clone()) })
}
