use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// State saved while a "Play Now" song temporarily replaces the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoplayRecord {
    /// `file_key` of the song being played
    pub song: String,
    /// Repeat before the song started
    pub repeat: bool,
    /// Consume before the song started
    pub consume: bool,
    /// Whether the old queue was saved for restoring
    pub saved: bool,
}

/// One autoplay record per server, stored as `<host>_<port>.json`
#[derive(Debug, Clone)]
pub struct AutoplayStore {
    dir: PathBuf,
}

impl AutoplayStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn default_location() -> Self {
        Self::new(super::default_data_dir().join("autoplay"))
    }

    fn path_for(&self, host: &str, port: u16) -> PathBuf {
        self.dir.join(format!("{}_{}.json", host, port))
    }

    pub fn load(&self, host: &str, port: u16) -> Result<Option<AutoplayRecord>> {
        let path = self.path_for(host, port);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read autoplay record: {:?}", path))?;
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse autoplay record: {:?}", path))?;
        Ok(Some(record))
    }

    pub fn save(&self, host: &str, port: u16, record: &AutoplayRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create directory: {:?}", self.dir))?;
        let path = self.path_for(host, port);
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write autoplay record: {:?}", path))?;
        Ok(())
    }

    pub fn remove(&self, host: &str, port: u16) -> Result<()> {
        let path = self.path_for(host, port);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove autoplay record: {:?}", path))?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_autoplay_round_trip_per_server() {
        let dir = tempfile::tempdir().unwrap();
        let store = AutoplayStore::new(dir.path().join("autoplay"));
        let record = AutoplayRecord {
            song: "YS5tcDM=".to_string(),
            repeat: true,
            consume: false,
            saved: true,
        };

        assert_eq!(store.load("host", 6600).unwrap(), None);
        store.save("host", 6600, &record).unwrap();
        assert_eq!(store.load("host", 6600).unwrap(), Some(record));
        assert_eq!(store.load("host", 6601).unwrap(), None);

        store.remove("host", 6600).unwrap();
        assert_eq!(store.load("host", 6600).unwrap(), None);
        // removing twice is fine
        store.remove("host", 6600).unwrap();
    }
}
