//! Staging-directory file helpers.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Write `bytes` to `path` through a sibling temp file and a rename.
///
/// Readers see either the previous file or the complete new one.
///
/// # Errors
/// Returns an error if the temp file cannot be written or moved into place.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut staged = tempfile::Builder::new().prefix(".partial-").tempfile_in(dir)?;
    staged.write_all(bytes)?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Delete `dir` (if present) and create it again, empty.
///
/// Not safe to run while other writers are using `dir`.
///
/// # Errors
/// Returns an error if the directory cannot be removed or created.
pub fn recreate_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}
