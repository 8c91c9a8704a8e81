//! Atomic channel writes.
//!
//! A payload is written to a temporary sibling of the target, flushed to
//! disk, then renamed over the target. A reader polling the target sees
//! either the previous complete file or the new complete file, never a
//! prefix of the new one.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use fbridge_core::{BridgeError, Result};
use tracing::{debug, trace};

/// Creates `dir` and its parents if missing.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| BridgeError::io("create directory", dir, e))
}

/// Removes `path`, treating an already-missing file as success.
///
/// Returns true if a file was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BridgeError::io("remove", path, e)),
    }
}

/// Atomically replaces the content of `path` with `content`.
///
/// The temporary file lives in the same directory as `path` so the final
/// rename never crosses filesystems. If the rename fails the temporary
/// file is deleted.
///
/// An existing target is replaced by the rename, not removed beforehand,
/// so a reader never sees it missing. It is removed only if the rename
/// itself fails.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        BridgeError::InvalidArgument(format!("not a file path: {}", path.display()))
    })?;

    let prefix = format!(".{}.", file_name.to_string_lossy());
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| BridgeError::io("create temp file", dir, e))?;
    let tmp_path = tmp.path().to_path_buf();

    tmp.write_all(content)
        .and_then(|()| tmp.flush())
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| BridgeError::io("write temp file", &tmp_path, e))?;

    match tmp.persist(path) {
        Ok(_) => {
            trace!(path = %path.display(), bytes = content.len(), "Atomic write complete");
            Ok(())
        }
        Err(err) => {
            // Some platforms refuse to rename onto an existing file: drop the
            // stale target and try once more.
            debug!(
                path = %path.display(),
                error = %err.error,
                "Rename failed, removing stale target"
            );
            remove_if_exists(path)?;
            err.file
                .persist(path)
                .map(|_| ())
                .map_err(|e| BridgeError::io("rename", path, e.error))
        }
    }
}
