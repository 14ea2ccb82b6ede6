use crate::{RemoteError, DEFAULT_PORT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the launcher finds its peer and how it introduces itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// `host:port` of the peer. A bare host gets [`DEFAULT_PORT`].
    pub address: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// Data directory reported to the peer in the handshake.
    #[serde(default)]
    pub data_directory: PathBuf,
}

fn default_name() -> String {
    "delaunch".to_owned()
}

impl RemoteConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.trim().to_owned(),
            name: default_name(),
            data_directory: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_owned();
        self
    }

    #[must_use]
    pub fn with_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_directory = dir.into();
        self
    }

    /// Address with the default port filled in.
    pub fn socket_address(&self) -> String {
        let has_port = self.address.rsplit_once(':').is_some_and(|(host, port)| {
            !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) && !host.ends_with(':')
        });
        if has_port {
            self.address.clone()
        } else {
            format!("{}:{DEFAULT_PORT}", self.address)
        }
    }

    /// Load config from `~/.config/delaunch/remote.json`.
    pub fn load_default() -> Result<Self, RemoteError> {
        let path = default_config_path()?;
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("invalid remote config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), RemoteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, RemoteError> {
    let home = std::env::var("HOME").map_err(|_| RemoteError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/delaunch/remote.json"))
}
