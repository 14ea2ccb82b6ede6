use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

const INSTALLED_VERSION_FILE: &str = "installed.version";
const LOCK_FILE: &str = ".install.lock";

/// Directory layout of one launcher instance.
///
/// The engine install directory is wiped and re-populated on every install;
/// everything else survives updates. Subdirectories are created lazily on
/// [`initialize`](Self::initialize).
#[derive(Debug, Clone)]
pub struct LauncherLayout {
    root: PathBuf,
}

impl LauncherLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unpacked engine payload.
    #[inline]
    pub fn engine_install_dir(&self) -> PathBuf {
        self.root.join("dragengine")
    }

    #[inline]
    pub fn engine_cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("dragengine")
    }

    #[inline]
    pub fn engine_config_dir(&self) -> PathBuf {
        self.root.join("config").join("dragengine")
    }

    #[inline]
    pub fn launcher_dir(&self) -> PathBuf {
        self.root.join("launcher")
    }

    #[inline]
    pub fn launcher_config_dir(&self) -> PathBuf {
        self.root.join("config").join("launcher")
    }

    #[inline]
    pub fn launcher_games_dir(&self) -> PathBuf {
        self.launcher_dir().join("games")
    }

    /// Marker recording which bundled version is unpacked in the install dir.
    /// Lives outside the install dir so wiping the payload leaves it alone.
    #[inline]
    pub fn installed_version_file(&self) -> PathBuf {
        self.root.join(INSTALLED_VERSION_FILE)
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.engine_cache_dir())?;
        fs::create_dir_all(self.engine_config_dir())?;
        fs::create_dir_all(self.launcher_config_dir())?;
        fs::create_dir_all(self.launcher_games_dir())?;
        Ok(())
    }
}
