//! Operation lock: process-local mutual exclusion between a backup and a
//! restore on the same engine process.
//!
//! This lock is explicitly **process-local**. Running more than one
//! replica of this service against the same targets requires either
//! pinning restores to a single replica or replacing this component with
//! an externally coordinated lock (e.g. an advisory lock in a shared
//! database); that distributed variant is not implemented here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, Result};
use crate::models::LockOperation;

const TTL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRecord {
    operation: LockOperation,
    acquired_at: DateTime<Utc>,
}

/// Current lock status, for read-only queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockStatus {
    pub is_locked: bool,
    pub operation: Option<LockOperation>,
    pub acquired_at: Option<DateTime<Utc>>,
}

/// File-backed lock. One instance per process; the path is the contended
/// resource so multiple `OperationLock` values pointing at the same path
/// still serialize correctly.
#[derive(Debug, Clone)]
pub struct OperationLock {
    path: PathBuf,
}

impl OperationLock {
    pub fn new(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            path: lock_path.into(),
        }
    }

    fn read_record(&self) -> Result<Option<LockRecord>> {
        match fs::read(&self.path) {
            Ok(bytes) => {
                let record: LockRecord = serde_json::from_slice(&bytes)?;
                Ok(Some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackupError::Io(e)),
        }
    }

    fn is_stale(record: &LockRecord) -> bool {
        let age = Utc::now().signed_duration_since(record.acquired_at);
        age.to_std().map(|d| d > TTL).unwrap_or(false)
    }

    /// Report the current lock state without mutating it.
    pub fn status(&self) -> Result<LockStatus> {
        match self.read_record()? {
            Some(record) if !Self::is_stale(&record) => Ok(LockStatus {
                is_locked: true,
                operation: Some(record.operation),
                acquired_at: Some(record.acquired_at),
            }),
            _ => Ok(LockStatus {
                is_locked: false,
                operation: None,
                acquired_at: None,
            }),
        }
    }

    /// Acquire the lock for `operation`. Fails with `Conflict` if a
    /// non-stale record for a different (or the same) operation exists.
    pub fn acquire(&self, operation: LockOperation) -> Result<LockGuard<'_>> {
        if let Some(existing) = self.read_record()? {
            if !Self::is_stale(&existing) {
                return Err(BackupError::Conflict(format!(
                    "a {:?} operation already holds the lock, acquired at {}",
                    existing.operation, existing.acquired_at
                )));
            }
        }
        let record = LockRecord {
            operation,
            acquired_at: Utc::now(),
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_vec(&record)?)?;
        Ok(LockGuard { lock: self })
    }

    fn release(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// RAII handle: the lock is released when this guard is dropped, on every
/// exit path including early returns from `?`.
pub struct LockGuard<'a> {
    lock: &'a OperationLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

pub fn default_lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join("operation.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn acquire_then_release_on_drop() {
        let dir = tempdir().unwrap();
        let lock = OperationLock::new(dir.path().join("lock.json"));
        assert!(!lock.status().unwrap().is_locked);
        {
            let _guard = lock.acquire(LockOperation::Backup).unwrap();
            assert!(lock.status().unwrap().is_locked);
        }
        assert!(!lock.status().unwrap().is_locked);
    }

    #[test]
    fn concurrent_acquire_conflicts() {
        let dir = tempdir().unwrap();
        let lock = OperationLock::new(dir.path().join("lock.json"));
        let _guard = lock.acquire(LockOperation::Backup).unwrap();
        let err = lock.acquire(LockOperation::Restore).unwrap_err();
        assert!(matches!(err, BackupError::Conflict(_)));
    }

    #[test]
    fn stale_lock_is_reclaimable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock.json");
        let lock = OperationLock::new(&path);
        let stale = LockRecord {
            operation: LockOperation::Backup,
            acquired_at: Utc::now() - chrono::Duration::hours(3),
        };
        fs::write(&path, serde_json::to_vec(&stale).unwrap()).unwrap();
        assert!(!lock.status().unwrap().is_locked);
        let _guard = lock.acquire(LockOperation::Restore).unwrap();
    }
}
