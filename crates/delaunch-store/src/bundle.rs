use crate::StoreError;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const ARCHIVE_FILE: &str = "install.zip";
const VERSION_FILE: &str = "install.version";
const SIZE_FILE: &str = "install.size";

/// Engine payload shipped with the host application.
///
/// A directory holding the archive, its version string and the total
/// uncompressed size used as the denominator for install progress.
#[derive(Debug, Clone)]
pub struct Bundle {
    dir: PathBuf,
}

impl Bundle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_path(&self) -> PathBuf {
        self.dir.join(ARCHIVE_FILE)
    }

    pub fn version_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE)
    }

    pub fn size_path(&self) -> PathBuf {
        self.dir.join(SIZE_FILE)
    }

    pub fn version(&self) -> Result<String, StoreError> {
        read_required(&self.version_path())
    }

    /// Size declared in `install.size`, `None` if the bundle has no size file.
    pub fn declared_size(&self) -> Result<Option<u64>, StoreError> {
        match fs::read_to_string(self.size_path()) {
            Ok(content) => {
                let trimmed = content.trim();
                trimmed
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|_| StoreError::InvalidSize(trimmed.to_owned()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes an install writes: the declared size, or the sum of the
    /// archive's uncompressed entry sizes when no size file is bundled.
    pub fn install_size(&self) -> Result<u64, StoreError> {
        if let Some(size) = self.declared_size()? {
            return Ok(size);
        }
        let path = self.archive_path();
        if !path.is_file() {
            return Err(StoreError::BundleMissing(path.display().to_string()));
        }
        let mut archive = ZipArchive::new(BufReader::new(File::open(&path)?))?;
        let mut total = 0u64;
        for i in 0..archive.len() {
            total += archive.by_index(i)?.size();
        }
        Ok(total)
    }
}

fn read_required(path: &Path) -> Result<String, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            Err(StoreError::BundleMissing(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
