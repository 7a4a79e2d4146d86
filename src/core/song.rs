use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A song as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// URI of the song relative to the music directory
    pub file: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    pub name: Option<String>,
    pub composer: Option<String>,
    pub performer: Option<String>,
    pub comment: Option<String>,
    /// Length in whole seconds
    pub time: Option<u32>,
    /// Queue id (only set for songs in the queue)
    pub id: Option<u32>,
    /// Queue position (only set for songs in the queue)
    pub pos: Option<u32>,
}

impl Song {
    /// Create a song with only its file set
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Default::default()
        }
    }

    /// Stable key for this song's file, safe for use in file names and storage
    pub fn file_key(&self) -> String {
        file_key(&self.file)
    }

    /// Length as `m:ss`, if known
    pub fn display_time(&self) -> Option<String> {
        self.time.map(format_time)
    }

    /// Track number as an integer, ignoring any `/total` suffix
    pub fn track_number(&self) -> Option<u32> {
        self.track
            .as_deref()
            .and_then(|t| t.split('/').next())
            .and_then(|t| t.trim().parse().ok())
    }

    /// Title if present, file otherwise
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.file)
    }
}

/// Base64 of the percent-encoded URI
pub fn file_key(uri: &str) -> String {
    STANDARD.encode(urlencoding::encode(uri).as_bytes())
}

/// Format whole seconds as `m:ss`
pub fn format_time(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Parse a raw MPD time value ("215" or "215.347") into whole seconds
pub fn parse_seconds(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.floor() as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(9), "0:09");
        assert_eq!(format_time(215), "3:35");
        assert_eq!(format_time(3600), "60:00");
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("215"), Some(215));
        assert_eq!(parse_seconds("215.987"), Some(215));
        assert_eq!(parse_seconds("abc"), None);
        assert_eq!(parse_seconds("-3"), None);
    }

    #[test]
    fn test_file_key_is_url_safe_input() {
        let song = Song::new("Artist/Album/01 Track.flac");
        let key = song.file_key();
        let decoded = STANDARD.decode(key).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "Artist%2FAlbum%2F01%20Track.flac"
        );
    }

    #[test]
    fn test_track_number() {
        let mut song = Song::new("a.mp3");
        song.track = Some("3/12".to_string());
        assert_eq!(song.track_number(), Some(3));
        song.track = Some("x".to_string());
        assert_eq!(song.track_number(), None);
    }
}
