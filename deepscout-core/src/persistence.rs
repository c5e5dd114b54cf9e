//! Persistence helpers — atomic writes, JSON loading, stale-file cleanup.
//!
//! Every artifact and checkpoint goes through the write-to-tmp-then-rename
//! pattern so a crash mid-write never leaves a torn file at the final path.
//! The progress snapshot read path deliberately does NOT live here: the
//! poller needs to distinguish absent from malformed (see `progress`).

use std::io;
use std::path::Path;

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling, then renames onto the target path.
/// Parent directories are created if missing.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Serialize `value` to pretty-printed JSON and atomically write it.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file does not exist; `Err` on read or
/// deserialization failure.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Remove a stale file if present.
///
/// Returns `Ok(true)` if a file was removed, `Ok(false)` if there was
/// nothing to remove. Used by the `--clean` startup flag to clear a
/// leftover progress snapshot from a previous run.
pub fn remove_stale(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
