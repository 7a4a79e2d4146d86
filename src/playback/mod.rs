pub mod player;
pub mod session;

pub use player::{PlayerItem, PlayerLooper, QueuePlayer};
pub use session::PlaybackSession;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{PlayerState, Status};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl From<PlayerState> for PlaybackState {
    fn from(state: PlayerState) -> Self {
        match state {
            PlayerState::Play => PlaybackState::Playing,
            PlayerState::Pause => PlaybackState::Paused,
            PlayerState::Stop => PlaybackState::Stopped,
        }
    }
}

/// Transport control requested from outside (media keys, lock screen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Stop,
    Previous,
    Next,
    PlayPause,
}

impl FromStr for RemoteCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "play" => Ok(RemoteCommand::Play),
            "pause" => Ok(RemoteCommand::Pause),
            "stop" => Ok(RemoteCommand::Stop),
            "previous" => Ok(RemoteCommand::Previous),
            "next" => Ok(RemoteCommand::Next),
            "playpause" => Ok(RemoteCommand::PlayPause),
            other => Err(format!("unknown remote command: {}", other)),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteCommand::Play => "play",
            RemoteCommand::Pause => "pause",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Previous => "previous",
            RemoteCommand::Next => "next",
            RemoteCommand::PlayPause => "playpause",
        };
        f.write_str(name)
    }
}

/// What the host's "now playing" display shows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NowPlayingInfo {
    pub state: PlaybackState,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_title: Option<String>,
    pub album_track_number: Option<u32>,
    /// Whole seconds
    pub elapsed: u64,
    /// Whole seconds
    pub duration: u64,
}

impl NowPlayingInfo {
    /// Build from the last known status. Track details are only filled in
    /// when the current song has a title.
    pub fn from_status(state: PlaybackState, status: Option<&Status>) -> Self {
        let mut info = NowPlayingInfo {
            state,
            ..Default::default()
        };
        let Some(status) = status else {
            return info;
        };
        let Some(song) = status.current_song.as_ref().filter(|s| s.title.is_some()) else {
            return info;
        };

        info.title = song.title.clone();
        info.artist = song.artist.clone();
        info.album_title = song.album.clone();
        info.album_track_number = song.track_number();
        info.elapsed = status.elapsed.map(|e| e.max(0.0).floor() as u64).unwrap_or(0);
        info.duration = status
            .duration
            .map(|d| d.max(0.0).floor() as u64)
            .or(song.time.map(u64::from))
            .unwrap_or(0);
        info
    }
}

/// Events broadcast by a playback session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged { playing: bool },
    NowPlayingChanged(NowPlayingInfo),
    Remote(RemoteCommand),
    /// Device volume in percent
    VolumeChanged(u8),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Song;

    #[test]
    fn test_remote_command_names() {
        for name in ["play", "pause", "stop", "previous", "next", "playpause"] {
            let cmd: RemoteCommand = name.parse().unwrap();
            assert_eq!(cmd.to_string(), name);
        }
        assert!("rewind".parse::<RemoteCommand>().is_err());
    }

    #[test]
    fn test_now_playing_from_status() {
        let mut song = Song::new("a.flac");
        song.title = Some("Title".to_string());
        song.artist = Some("Artist".to_string());
        song.track = Some("3/12".to_string());
        song.time = Some(200);

        let status = Status {
            elapsed: Some(12.7),
            current_song: Some(song),
            ..Default::default()
        };

        let info = NowPlayingInfo::from_status(PlaybackState::Playing, Some(&status));
        assert_eq!(info.title.as_deref(), Some("Title"));
        assert_eq!(info.album_track_number, Some(3));
        assert_eq!(info.elapsed, 12);
        assert_eq!(info.duration, 200);
    }

    #[test]
    fn test_now_playing_without_title_only_has_state() {
        let status = Status {
            current_song: Some(Song::new("stream")),
            elapsed: Some(5.0),
            ..Default::default()
        };
        let info = NowPlayingInfo::from_status(PlaybackState::Paused, Some(&status));
        assert_eq!(
            info,
            NowPlayingInfo {
                state: PlaybackState::Paused,
                ..Default::default()
            }
        );
    }
}
