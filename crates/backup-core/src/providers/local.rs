//! Local filesystem storage provider.
//!
//! `dest_name` may contain exactly one forward-slash segment, placing the
//! artifact in a per-target subdirectory. `backup_id` equals the relative
//! POSIX path under `base_path`. Empty parent directories are pruned on
//! delete.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StorageProvider;
use crate::error::{BackupError, Result};
use crate::models::StoredBackup;

#[derive(Debug, Clone)]
pub struct LocalProvider {
    base_path: PathBuf,
}

impl LocalProvider {
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn resolve(&self, backup_id: &str) -> Result<PathBuf> {
        self.check_backup_id(backup_id)?;
        Ok(self.base_path.join(backup_id))
    }

    fn check_backup_id(&self, backup_id: &str) -> Result<()> {
        let path = Path::new(backup_id);
        if path.is_absolute() || path.components().any(|c| c == std::path::Component::ParentDir) {
            return Err(BackupError::Validation(format!(
                "invalid backup_id for local destination: {backup_id}"
            )));
        }
        Ok(())
    }

    fn mtime(path: &Path) -> Result<DateTime<Utc>> {
        let metadata = fs::metadata(path)?;
        let modified = metadata.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn walk(&self, dir: &Path, rel_prefix: &str, out: &mut Vec<(String, PathBuf)>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(BackupError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{rel_prefix}/{name}")
            };
            if path.is_dir() {
                self.walk(&path, &rel, out)?;
            } else {
                out.push((rel, path));
            }
        }
        Ok(())
    }

    /// Remove `dir` and any now-empty ancestors up to (not including)
    /// `base_path`.
    fn prune_empty_parents(&self, mut dir: PathBuf) {
        while dir != self.base_path && dir.starts_with(&self.base_path) {
            match fs::read_dir(&dir) {
                Ok(mut entries) => {
                    if entries.next().is_some() {
                        break;
                    }
                }
                Err(_) => break,
            }
            if fs::remove_dir(&dir).is_err() {
                break;
            }
            match dir.parent() {
                Some(p) => dir = p.to_path_buf(),
                None => break,
            }
        }
    }
}

#[async_trait]
impl StorageProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    async fn list_backups(&self, prefix: &str) -> Result<Vec<StoredBackup>> {
        let base = self.base_path.clone();
        let provider = self.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            provider.walk(&base, "", &mut entries)?;
            let mut backups = Vec::new();
            for (rel, path) in entries {
                if !rel.starts_with(&prefix) {
                    continue;
                }
                let metadata = fs::metadata(&path)?;
                backups.push(StoredBackup {
                    id: rel.clone(),
                    name: Path::new(&rel)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or(rel),
                    created_at: LocalProvider::mtime(&path)?,
                    size: Some(metadata.len()),
                });
            }
            backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(backups)
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("local listing task panicked: {e}")))?
    }

    async fn upload_backup(&self, local_path: &Path, dest_name: &str) -> Result<StoredBackup> {
        self.check_backup_id(dest_name)?;
        let dest_path = self.base_path.join(dest_name);
        let local_path = local_path.to_path_buf();
        let dest_path_clone = dest_path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = dest_path_clone.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&local_path, &dest_path_clone)?;
            Ok::<_, BackupError>(())
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("local upload task panicked: {e}")))??;

        let metadata = fs::metadata(&dest_path)?;
        Ok(StoredBackup {
            id: dest_name.to_string(),
            name: Path::new(dest_name)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| dest_name.to_string()),
            created_at: Self::mtime(&dest_path)?,
            size: Some(metadata.len()),
        })
    }

    async fn download_backup(&self, backup_id: &str, dest_path: &Path) -> Result<()> {
        let source = self.resolve(backup_id)?;
        let dest_path = dest_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &dest_path)?;
            Ok::<_, BackupError>(())
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("local download task panicked: {e}")))?
    }

    async fn delete_backups(&self, backups: &[StoredBackup]) -> Result<()> {
        for backup in backups {
            let path = self.resolve(&backup.id)?;
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(BackupError::Io(e)),
            }
            if let Some(parent) = path.parent() {
                self.prune_empty_parents(parent.to_path_buf());
            }
        }
        Ok(())
    }

    async fn validate_backup_id(&self, backup_id: &str) -> Result<()> {
        self.check_backup_id(backup_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upload_list_download_delete_round_trip() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path()).unwrap();

        let src_dir = tempdir().unwrap();
        let src_file = src_dir.path().join("artifact.sql.gz");
        fs::write(&src_file, b"dump contents").unwrap();

        let stored = provider
            .upload_backup(&src_file, "pg_main/sched-1-backup.sql.gz")
            .await
            .unwrap();
        assert_eq!(stored.id, "pg_main/sched-1-backup.sql.gz");

        let listed = provider.list_backups("pg_main/sched-1-").await.unwrap();
        assert_eq!(listed.len(), 1);

        let out = src_dir.path().join("restored.sql.gz");
        provider.download_backup(&stored.id, &out).await.unwrap();
        assert_eq!(fs::read(&out).unwrap(), b"dump contents");

        provider.delete_backups(&[stored]).await.unwrap();
        assert!(provider.list_backups("pg_main/").await.unwrap().is_empty());
        // Empty target subdirectory should have been pruned.
        assert!(!dir.path().join("pg_main").exists());
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempdir().unwrap();
        let provider = LocalProvider::new(dir.path()).unwrap();
        assert!(provider.validate_backup_id("../escape.txt").await.is_err());
        assert!(provider.validate_backup_id("/etc/passwd").await.is_err());
        assert!(provider.validate_backup_id("pg_main/file.sql.gz").await.is_ok());
    }
}
