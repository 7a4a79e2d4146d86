//! Small JSON stores kept in the platform data directory

pub mod autoplay;
pub mod connections;

pub use autoplay::{AutoplayRecord, AutoplayStore};
pub use connections::{ConnectionStore, SavedServer};

use std::path::PathBuf;

use crate::config::APP_DIR;

/// Default root for persisted state
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}
