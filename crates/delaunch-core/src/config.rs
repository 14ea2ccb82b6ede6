use crate::CoreError;
use delaunch_store::{Bundle, LauncherLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Launcher settings read from `delaunch.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Directory holding the engine install, caches and launcher data.
    pub root: PathBuf,
    /// Directory with `install.zip`, `install.version` and `install.size`.
    pub bundle_dir: PathBuf,
    /// Name announced to remote peers.
    pub name: String,
    /// Display scale factor in percent applied to game window sizes.
    pub scale_percent: u32,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("delaunch"),
            bundle_dir: PathBuf::from("bundle"),
            name: "delaunch".to_owned(),
            scale_percent: 100,
        }
    }
}

impl LauncherConfig {
    pub fn new(root: impl Into<PathBuf>, bundle_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            bundle_dir: bundle_dir.into(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Defaults when `path` does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, CoreError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn layout(&self) -> LauncherLayout {
        LauncherLayout::new(&self.root)
    }

    pub fn bundle(&self) -> Bundle {
        Bundle::new(&self.bundle_dir)
    }
}
