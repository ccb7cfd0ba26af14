//! Uniform storage-provider interface over local, SFTP, and Google Drive.
//!
//! ```text
//! list_backups(prefix)                 -> [StoredBackup]   # newest-first
//! upload_backup(local_path, dest_name) -> StoredBackup
//! download_backup(backup_id, dest_path) -> dest_path
//! delete_backups([StoredBackup])       -> ()
//! ```
//!
//! Local and SFTP I/O is blocking and dispatched through
//! `tokio::task::spawn_blocking` internally; Google Drive calls go
//! through `reqwest` directly on the async runtime.

mod gdrive;
mod local;
mod sftp;

pub use gdrive::GoogleDriveProvider;
pub use local::LocalProvider;
pub use sftp::{SftpAuth, SftpProvider};

use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::StoredBackup;

#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// List backups whose id starts with `prefix`, newest-first.
    async fn list_backups(&self, prefix: &str) -> Result<Vec<StoredBackup>>;

    async fn upload_backup(&self, local_path: &Path, dest_name: &str) -> Result<StoredBackup>;

    async fn download_backup(&self, backup_id: &str, dest_path: &Path) -> Result<()>;

    async fn delete_backups(&self, backups: &[StoredBackup]) -> Result<()>;

    /// Enforced at the boundary by every operation accepting a
    /// caller-supplied `backup_id`: local ids must be relative with no
    /// `..`; SFTP ids must carry `base_path` as a prefix; Drive ids are
    /// validated by walking parents (hence async: it may require network
    /// calls).
    async fn validate_backup_id(&self, backup_id: &str) -> Result<()>;
}
