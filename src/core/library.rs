use serde::{Deserialize, Serialize};

/// An album, optionally grouped under an artist and a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub name: String,
    pub artist: Option<String>,
    pub date: Option<String>,
}

impl Album {
    pub fn new(name: impl Into<String>, artist: Option<String>) -> Self {
        Self {
            name: name.into(),
            artist,
            date: None,
        }
    }

    /// Release year for ordering; unknown dates sort last
    pub fn sort_year(&self) -> i64 {
        self.date
            .as_deref()
            .and_then(leading_int)
            .unwrap_or(100_000)
    }
}

/// Parse the leading digits of a value the way a lenient integer parse would
pub(crate) fn leading_int(value: &str) -> Option<i64> {
    let trimmed = value.trim_start();
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub name: String,
}

/// An audio output configured on the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: String,
    pub name: String,
    pub enabled: bool,
}

/// A file in a directory listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub file: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// A sub-directory in a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub dir: String,
}

/// Result of `lsinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileList {
    pub dirs: Vec<DirEntry>,
    pub files: Vec<FileEntry>,
}
