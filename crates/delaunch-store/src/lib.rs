//! On-disk state for the delaunch launcher.
//!
//! This crate provides the storage layer: `LauncherLayout` for the directory
//! structure handed to the engine, installed-version markers written
//! atomically, the `Bundle` describing the engine payload shipped with the
//! host application, `unpack_archive` which installs that payload with
//! progress reporting and cooperative cancellation, and `GameStore` for the
//! launcher's persisted game records.

pub mod bundle;
pub mod games;
pub mod install;
pub mod layout;
pub mod version;

pub use bundle::Bundle;
pub use games::{validate_game_id, GameRecord, GameStore};
pub use install::{unpack_archive, UnpackOutcome};
pub use layout::LauncherLayout;
pub use version::{read_version_marker, versions_match, write_version_marker};

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Replace `dest` with `content` through a temporary file in the same directory.
pub(crate) fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = dest
        .parent()
        .ok_or_else(|| StoreError::InvalidPath(dest.display().to_string()))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("install archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("install archive entry escapes the target directory: {0}")]
    UnsafeEntry(String),
    #[error("bundle file missing: {0}")]
    BundleMissing(String),
    #[error("invalid bundle size marker: {0}")]
    InvalidSize(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("game not found: {0}")]
    GameNotFound(String),
    #[error("invalid game identifier: {0}")]
    InvalidGameId(String),
    #[error("game schema error: {0}")]
    Schema(#[from] delaunch_schema::SchemaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_unsafe_entry() {
        let e = StoreError::UnsafeEntry("../etc/passwd".to_owned());
        assert!(e.to_string().contains("../etc/passwd"));
    }

    #[test]
    fn store_error_display_game_not_found() {
        let e = StoreError::GameNotFound("abc".to_owned());
        assert!(e.to_string().contains("abc"));
    }

    #[test]
    fn store_error_display_bundle_missing() {
        let e = StoreError::BundleMissing("install.zip".to_owned());
        assert!(e.to_string().contains("install.zip"));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("sub").join("file.txt");
        write_atomic(&dest, b"one").unwrap();
        write_atomic(&dest, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "two");
    }
}
