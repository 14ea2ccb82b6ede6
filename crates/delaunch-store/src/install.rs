use crate::StoreError;
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use zip::ZipArchive;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackOutcome {
    Completed { bytes: u64 },
    /// Stopped between entries; the partial target has been removed.
    Cancelled,
}

/// Unpack a zip archive into `target`, replacing whatever was there.
///
/// `progress` receives `min(written / total, 1.0)` after every chunk written
/// and a final `1.0` on completion, so the reported values never decrease.
/// `cancel` is checked before each entry. On error the partially written
/// target is left in place; the next install removes it first.
pub fn unpack_archive(
    archive: &Path,
    target: &Path,
    total: u64,
    cancel: &AtomicBool,
    mut progress: impl FnMut(f32),
) -> Result<UnpackOutcome, StoreError> {
    if !archive.is_file() {
        return Err(StoreError::BundleMissing(archive.display().to_string()));
    }
    if target.exists() {
        debug!("removing previous install at {}", target.display());
        fs::remove_dir_all(target)?;
    }
    fs::create_dir_all(target)?;

    let mut zip = ZipArchive::new(BufReader::new(File::open(archive)?))?;
    info!(
        "unpacking {} entries from {} into {}",
        zip.len(),
        archive.display(),
        target.display()
    );

    let mut written = 0u64;
    let mut buf = vec![0u8; CHUNK_SIZE];
    for i in 0..zip.len() {
        if cancel.load(Ordering::SeqCst) {
            info!("install cancelled after {written} bytes, removing partial target");
            fs::remove_dir_all(target)?;
            return Ok(UnpackOutcome::Cancelled);
        }

        let mut entry = zip.by_index(i)?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| StoreError::UnsafeEntry(entry.name().to_owned()))?;
        let out_path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&out_path)?;
        loop {
            let n = entry.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            written += n as u64;
            progress(fraction(written, total));
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))?;
            }
        }
    }

    progress(1.0);
    info!("install complete, {written} bytes written");
    Ok(UnpackOutcome::Completed { bytes: written })
}

fn fraction(written: u64, total: u64) -> f32 {
    if total == 0 {
        return 1.0;
    }
    (written as f64 / total as f64).min(1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use zip::write::SimpleFileOptions;

    fn make_archive(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn unpacks_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        make_archive(
            &archive,
            &[
                ("bin/engine", b"ELF".to_vec()),
                ("share/data.txt", b"payload".to_vec()),
            ],
        );
        let target = dir.path().join("out");
        let cancel = AtomicBool::new(false);
        let outcome = unpack_archive(&archive, &target, 10, &cancel, |_| {}).unwrap();
        assert_eq!(outcome, UnpackOutcome::Completed { bytes: 10 });
        assert_eq!(fs::read(target.join("bin/engine")).unwrap(), b"ELF");
        assert_eq!(
            fs::read_to_string(target.join("share/data.txt")).unwrap(),
            "payload"
        );
    }

    #[test]
    fn replaces_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        make_archive(&archive, &[("new.txt", b"new".to_vec())]);
        let target = dir.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "old").unwrap();

        let cancel = AtomicBool::new(false);
        unpack_archive(&archive, &target, 3, &cancel, |_| {}).unwrap();
        assert!(!target.join("stale.txt").exists());
        assert!(target.join("new.txt").exists());
    }

    #[test]
    fn progress_is_monotonic_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        let big = vec![7u8; CHUNK_SIZE * 3 + 17];
        make_archive(
            &archive,
            &[("a.bin", big.clone()), ("b.bin", big.clone()), ("c.bin", big)],
        );
        let target = dir.path().join("out");
        let cancel = AtomicBool::new(false);
        let mut seen = Vec::new();
        // Understated total: values must still cap at 1.0.
        unpack_archive(&archive, &target, 1000, &cancel, |p| seen.push(p)).unwrap();

        assert!(seen.len() > 3);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn cancel_before_start_removes_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        make_archive(&archive, &[("a.txt", b"a".to_vec())]);
        let target = dir.path().join("out");
        let cancel = AtomicBool::new(true);
        let outcome = unpack_archive(&archive, &target, 1, &cancel, |_| {}).unwrap();
        assert_eq!(outcome, UnpackOutcome::Cancelled);
        assert!(!target.exists());
    }

    #[test]
    fn cancel_between_entries_removes_partial_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        make_archive(
            &archive,
            &[
                ("first.txt", b"first".to_vec()),
                ("second.txt", b"second".to_vec()),
            ],
        );
        let target = dir.path().join("out");
        let cancel = AtomicBool::new(false);
        let outcome = unpack_archive(&archive, &target, 11, &cancel, |_| {
            cancel.store(true, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(outcome, UnpackOutcome::Cancelled);
        assert!(!target.exists());
    }

    #[test]
    fn missing_archive_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = AtomicBool::new(false);
        let err = unpack_archive(
            &dir.path().join("nope.zip"),
            &dir.path().join("out"),
            0,
            &cancel,
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::BundleMissing(_)));
    }

    #[test]
    fn corrupt_archive_fails_and_leaves_target() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("install.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();
        let target = dir.path().join("out");
        let cancel = AtomicBool::new(false);
        let err = unpack_archive(&archive, &target, 0, &cancel, |_| {}).unwrap_err();
        assert!(matches!(err, StoreError::Archive(_)));
        assert!(target.exists());
    }

    #[test]
    fn zero_total_reports_complete() {
        assert!((fraction(5, 0) - 1.0).abs() < f32::EPSILON);
        assert!((fraction(5, 10) - 0.5).abs() < f32::EPSILON);
        assert!((fraction(50, 10) - 1.0).abs() < f32::EPSILON);
    }
}
