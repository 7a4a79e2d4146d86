use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::song::Song;

/// Player state as reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl FromStr for PlayerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(PlayerState::Play),
            "pause" => Ok(PlayerState::Pause),
            "stop" => Ok(PlayerState::Stop),
            other => Err(format!("unknown player state: {}", other)),
        }
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Play => "play",
            PlayerState::Pause => "pause",
            PlayerState::Stop => "stop",
        };
        f.write_str(s)
    }
}

/// Snapshot of the server's player status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub volume: Option<i32>,
    pub repeat: bool,
    pub random: bool,
    /// "0", "1" or "oneshot"
    pub single: String,
    pub consume: bool,
    /// Queue version
    pub playlist: u32,
    pub playlist_length: u32,
    pub state: PlayerState,
    pub song: Option<u32>,
    pub song_id: Option<u32>,
    pub next_song: Option<u32>,
    pub next_song_id: Option<u32>,
    /// Elapsed seconds of the current song
    pub elapsed: Option<f64>,
    /// Length of the current song in seconds
    pub duration: Option<f64>,
    /// Instantaneous bitrate in kbps
    pub bitrate: Option<u32>,
    /// Audio format as `samplerate:bits:channels`
    pub audio: Option<String>,
    pub crossfade: Option<u32>,
    pub updating_db: Option<u32>,
    pub error: Option<String>,
    pub replay_gain_mode: Option<String>,
    pub current_song: Option<Song>,
    /// Set when an autoplay session ended and the queue was restored
    pub reload_queue: bool,
    /// Keys not modelled above, in server order
    pub extra: BTreeMap<String, String>,
}

impl Status {
    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Play
    }

    /// Length of the current song, falling back to the song's own time tag
    pub fn total_time(&self) -> Option<u32> {
        self.duration
            .map(|d| d.floor() as u32)
            .or_else(|| self.current_song.as_ref().and_then(|s| s.time))
    }
}

/// Database statistics as reported by `stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub songs: u32,
    pub artists: u32,
    pub albums: u32,
    pub uptime: u64,
    pub playtime: u64,
    pub db_playtime: u64,
    /// Unix time of the last database update
    pub db_update: u64,
}
