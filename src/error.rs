use thiserror::Error;

use crate::protocol::AckError;

/// Errors returned by the MPD client
#[derive(Error, Debug)]
pub enum MpdError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("{0}")]
    Ack(AckError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0}")]
    Timeout(String),

    #[error("{0} is not supported by this server")]
    Unsupported(String),

    #[error("There is already a 'Play Now' song playing")]
    AutoplayPending,

    #[error("No embedded album art for {artist} {album}")]
    NoAlbumArt { artist: String, album: String },
}

pub type Result<T> = std::result::Result<T, MpdError>;
