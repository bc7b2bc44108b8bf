//! Spool — disk-backed durable queue of undelivered telemetry records.
//!
//! One file per record, written atomically (temp file in the spool
//! directory, then rename into place) so a partially written entry is
//! never visible to the resend worker. Entries are named by a
//! zero-padded creation timestamp plus a process-local sequence number,
//! making lexicographic filename order the creation order. The spool
//! scans the directory on startup to resume pending resends after a
//! restart.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Durable on-disk queue of wire-form records awaiting resend.
pub struct Spool {
    /// Directory holding one `.json` file per pending record.
    spool_dir: PathBuf,
    /// Disambiguates entries created within the same nanosecond tick.
    sequence: AtomicU64,
}

/// One record persisted in the spool directory.
///
/// Owned exclusively by the spool until [`Spool::remove`] deletes it;
/// the content is opaque bytes — exactly what will be sent on resend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolEntry {
    path: PathBuf,
}

impl SpoolEntry {
    /// Read the full record bytes back from disk.
    pub fn read(&self) -> Result<Vec<u8>, SpoolError> {
        fs::read(&self.path).map_err(|e| SpoolError::Io(e.to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Spool {
    /// Create or open a spool at the given directory.
    pub fn open<P: AsRef<Path>>(spool_dir: P) -> Result<Self, SpoolError> {
        let spool_dir = spool_dir.as_ref().to_path_buf();
        fs::create_dir_all(&spool_dir).map_err(|e| SpoolError::Io(e.to_string()))?;

        let spool = Self {
            spool_dir,
            sequence: AtomicU64::new(0),
        };

        let pending = spool.pending_count()?;
        if pending > 0 {
            info!(pending, "Spool opened with pending records");
        } else {
            debug!("Spool opened (empty)");
        }

        Ok(spool)
    }

    /// Persist one record as a new spool entry.
    ///
    /// The payload is written to a temporary file inside the spool
    /// directory and renamed into place — never a direct truncating
    /// write — so [`list_pending`](Self::list_pending) can only ever
    /// observe fully written entries.
    pub fn enqueue(&self, payload: &[u8]) -> Result<SpoolEntry, SpoolError> {
        let final_path = self.spool_dir.join(self.next_entry_name());

        let mut temp = tempfile::NamedTempFile::new_in(&self.spool_dir)
            .map_err(|e| SpoolError::Io(e.to_string()))?;
        temp.write_all(payload)
            .and_then(|()| temp.flush())
            .map_err(|e| SpoolError::Io(e.to_string()))?;
        temp.persist(&final_path)
            .map_err(|e| SpoolError::Io(e.to_string()))?;

        debug!(
            entry = %final_path.display(),
            size_bytes = payload.len(),
            "Record spooled"
        );
        Ok(SpoolEntry { path: final_path })
    }

    /// Snapshot of all pending entries, in creation order.
    ///
    /// Temporary files (no `.json` extension) are invisible here, which
    /// is what makes the enqueue atomic from the reader's point of view.
    pub fn list_pending(&self) -> Result<Vec<SpoolEntry>, SpoolError> {
        let entries = fs::read_dir(&self.spool_dir).map_err(|e| SpoolError::Io(e.to_string()))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|ext| ext.to_str()) == Some("json"))
            .collect();
        paths.sort();

        Ok(paths.into_iter().map(|path| SpoolEntry { path }).collect())
    }

    /// Delete an entry after successful resend. Idempotent: an entry
    /// that is already gone is not an error.
    pub fn remove(&self, entry: &SpoolEntry) -> Result<(), SpoolError> {
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                debug!(entry = %entry.path.display(), "Spool entry removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SpoolError::Io(e.to_string())),
        }
    }

    /// Number of pending entries.
    pub fn pending_count(&self) -> Result<usize, SpoolError> {
        Ok(self.list_pending()?.len())
    }

    /// Unique, lexicographically increasing entry filename.
    fn next_entry_name(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{nanos:020}-{seq:06}.json")
    }
}

/// Spool errors. Local storage trouble is never fatal to the pipeline;
/// callers log and either drop the record or leave the entry for retry.
#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("IO error: {0}")]
    Io(String),
}
