use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Directory name used under the platform config and data directories
pub const APP_DIR: &str = "mpd-remote";

/// Persistent application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub sort_albums_by_date: bool,
    /// Tag used to filter random playlists (`genre`, `artist`, ...)
    pub random_playlist_by_type: Option<String>,
    pub max_list_size: usize,
    pub auto_connect: bool,
    /// Saved server name to connect to on start
    pub auto_connect_server: Option<String>,
    pub use_device_volume: bool,
    pub use_now_playing_control: bool,
    pub status_interval_secs: u64,
    pub command_timeout_ticks: u32,
    pub connect_timeout_secs: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    /// Where album art files are written; defaults to the data directory
    pub album_art_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sort_albums_by_date: false,
            random_playlist_by_type: None,
            max_list_size: 1000,
            auto_connect: false,
            auto_connect_server: None,
            use_device_volume: false,
            use_now_playing_control: false,
            status_interval_secs: 30,
            command_timeout_ticks: 360,
            connect_timeout_secs: 10,
            reconnect_delay_ms: 1000,
            max_reconnect_attempts: 5,
            album_art_dir: None,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("settings.json"))
    }

    /// Load from the default location; anything unreadable yields the defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            debug!("No settings at {:?}, using defaults", path);
            return Self::default();
        }
        match fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {:?}", path))
            .and_then(|contents| {
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse settings: {:?}", path))
            }) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("{:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("No config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write settings: {:?}", path))?;
        Ok(())
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Album art directory, falling back to the platform data directory
    pub fn album_art_dir(&self) -> PathBuf {
        self.album_art_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("albumart")
        })
    }
}
