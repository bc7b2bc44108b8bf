//! Snapshot file — always holds only the most recently ingested record.
//!
//! The file is fully overwritten (never appended) on every fix. Writes
//! are best-effort: a failure is the caller's to log, and never blocks
//! delivery.

use std::fs;
use std::path::Path;

/// Overwrite the snapshot file with the latest wire-form record.
///
/// Parent directories are created on first use so a fresh deployment
/// does not need them pre-made.
pub fn write_snapshot(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, payload)
}
