use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Exclusive lock on a launcher root, held while the engine payload is
/// unpacked so two launchers never install into the same directory.
///
/// The holder writes its process id into the lock file; a waiting launcher
/// reports it.
pub struct InstallLock {
    file: File,
    path: PathBuf,
}

impl InstallLock {
    /// Take the lock, blocking while another launcher holds it.
    pub fn acquire(lock_path: &Path) -> Result<Self, CoreError> {
        if let Some(lock) = Self::try_acquire(lock_path)? {
            return Ok(lock);
        }
        match Self::holder(lock_path) {
            Some(pid) => info!("waiting for install lock held by process {pid}"),
            None => info!("waiting for install lock {}", lock_path.display()),
        }
        let file = open(lock_path)?;
        file.lock_exclusive()
            .map_err(|e| CoreError::LockFailed(format!("{}: {e}", lock_path.display())))?;
        Self::claim(file, lock_path)
    }

    /// Take the lock only if it is free.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, CoreError> {
        let file = open(lock_path)?;
        if file.try_lock_exclusive().is_err() {
            return Ok(None);
        }
        Self::claim(file, lock_path).map(Some)
    }

    /// Process id recorded by the current or last holder.
    pub fn holder(lock_path: &Path) -> Option<u32> {
        let mut content = String::new();
        File::open(lock_path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .ok()?;
        content.trim().parse().ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn claim(mut file: File, lock_path: &Path) -> Result<Self, CoreError> {
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        debug!("install lock taken: {}", lock_path.display());
        Ok(Self {
            file,
            path: lock_path.to_path_buf(),
        })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!("cannot clear install lock {}: {e}", self.path.display());
        }
        let _ = self.file.unlock();
    }
}

fn open(lock_path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)?)
}

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Route Ctrl-C into [`shutdown_requested`]. A second signal exits at once.
pub fn install_signal_handler() -> Result<(), CoreError> {
    ctrlc::set_handler(|| {
        if SHUTDOWN_REQUESTED.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        eprintln!("\nshutdown requested, stopping game...");
    })
    .map_err(|e| CoreError::Signal(e.to_string()))
}

pub fn request_shutdown() {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}
