use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A server the user has saved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedServer {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SavedServer {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            password: None,
        }
    }

    fn same_endpoint(&self, other: &SavedServer) -> bool {
        self.host == other.host && self.port == other.port
    }
}

/// Saved server list backed by one JSON file
pub struct ConnectionStore {
    path: PathBuf,
}

impl ConnectionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data dir>/connections.json`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("connections.json"))
    }

    pub fn default_location() -> Self {
        Self::in_dir(&super::default_data_dir())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saved servers; a missing file is an empty list and gets created
    pub fn list(&self) -> Result<Vec<SavedServer>> {
        if !self.path.exists() {
            debug!("No saved servers at {:?}", self.path);
            let empty = Vec::new();
            self.write(&empty)?;
            return Ok(empty);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read saved servers: {:?}", self.path))?;
        let servers = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse saved servers: {:?}", self.path))?;
        Ok(servers)
    }

    pub fn find(&self, name: &str) -> Result<Option<SavedServer>> {
        Ok(self.list()?.into_iter().find(|s| s.name == name))
    }

    /// Add a server. Returns false when the name or host and port already exist.
    pub fn add(&self, server: SavedServer) -> Result<bool> {
        let mut servers = self.list()?;
        if servers
            .iter()
            .any(|s| s.name == server.name || s.same_endpoint(&server))
        {
            return Ok(false);
        }
        info!("Saving server {} ({}:{})", server.name, server.host, server.port);
        servers.push(server);
        self.write(&servers)?;
        Ok(true)
    }

    /// Replace the server with the same name. Returns false if there is none.
    pub fn update(&self, server: SavedServer) -> Result<bool> {
        let mut servers = self.list()?;
        let Some(existing) = servers.iter_mut().find(|s| s.name == server.name) else {
            return Ok(false);
        };
        *existing = server;
        self.write(&servers)?;
        Ok(true)
    }

    /// Remove the server matching name, host and port
    pub fn remove(&self, server: &SavedServer) -> Result<bool> {
        let mut servers = self.list()?;
        let before = servers.len();
        servers.retain(|s| !(s.name == server.name && s.same_endpoint(server)));
        if servers.len() == before {
            return Ok(false);
        }
        self.write(&servers)?;
        Ok(true)
    }

    fn write(&self, servers: &[SavedServer]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(servers)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write saved servers: {:?}", self.path))?;
        Ok(())
    }
}
