//! Remote control client for the Music Player Daemon
//!
//! [`MpdClient`] talks to a server over one [`SocketConnection`], queueing
//! commands so only one is in flight at a time. [`PlaybackSession`] is the
//! host-side controller that mirrors what the server plays and turns media
//! keys into client calls.

pub mod client;
pub mod config;
pub mod connection;
pub mod core;
pub mod error;
pub mod playback;
pub mod protocol;
pub mod storage;

pub use client::{AlbumArt, ClientEvent, ClientOptions, MpdClient, DEFAULT_PORT};
pub use config::Settings;
pub use connection::SocketConnection;
pub use error::{MpdError, Result};
pub use playback::PlaybackSession;
