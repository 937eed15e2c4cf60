//! Atomic file writes.
//!
//! Data is written to a temporary file in the destination directory and
//! renamed into place, so the final path either holds the complete new
//! contents or is untouched. The temporary file is removed if anything
//! fails before the rename.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `bytes` to `path` atomically.
///
/// # Errors
///
/// Returns the underlying I/O error if the temporary file cannot be
/// created, written, synced, or renamed. `path` is left unchanged.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Copy `src` to `dst` byte-for-byte, atomically with respect to `dst`.
///
/// # Errors
///
/// Returns the underlying I/O error if `src` cannot be read or `dst`
/// cannot be written.
pub fn copy_atomic(src: &Path, dst: &Path) -> std::io::Result<()> {
    let bytes = fs::read(src)?;
    write_atomic(dst, &bytes)
}
