use crate::{write_atomic, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Read a version marker. A missing file is `Ok(None)`.
pub fn read_version_marker(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn write_version_marker(path: &Path, version: &str) -> Result<(), StoreError> {
    write_atomic(path, version.as_bytes())
}

/// Compare an installed marker with the bundled version.
///
/// Byte-for-byte after stripping trailing line breaks on both sides. A missing
/// marker never matches.
pub fn versions_match(installed: Option<&str>, bundled: &str) -> bool {
    match installed {
        Some(installed) => strip_line_breaks(installed) == strip_line_breaks(bundled),
        None => false,
    }
}

fn strip_line_breaks(s: &str) -> &str {
    s.trim_end_matches(['\n', '\r'])
}
