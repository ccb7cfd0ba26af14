//! SFTP storage provider.
//!
//! Connections are established per-call (no persistent pool) with a 10 s
//! connect timeout, using the `ssh2` crate's blocking session/sftp API,
//! dispatched through `tokio::task::spawn_blocking`. Paths are validated
//! to start with `base_path` before any delete.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ssh2::Session;

use super::StorageProvider;
use crate::error::{BackupError, Result};
use crate::models::StoredBackup;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub enum SftpAuth {
    Password(String),
    PrivateKey {
        key_material: String,
        passphrase: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct SftpProvider {
    host: String,
    port: u16,
    username: String,
    base_path: String,
    auth: SftpAuth,
}

impl SftpProvider {
    pub fn new(host: String, port: u16, username: String, base_path: String, auth: SftpAuth) -> Self {
        let base_path = base_path.trim_end_matches('/').to_string();
        Self {
            host,
            port,
            username,
            base_path,
            auth,
        }
    }

    fn connect(&self) -> Result<(Session, ssh2::Sftp)> {
        use std::net::ToSocketAddrs;
        let addr = format!("{}:{}", self.host, self.port);
        let socket_addr = addr
            .to_socket_addrs()
            .ok()
            .and_then(|mut it| it.next())
            .ok_or_else(|| BackupError::ProviderFailure(format!("cannot resolve {addr}")))?;
        let tcp = TcpStream::connect_timeout(&socket_addr, CONNECT_TIMEOUT)
            .map_err(|e| BackupError::ProviderFailure(format!("sftp connect to {addr} failed: {e}")))?;
        tcp.set_read_timeout(Some(CONNECT_TIMEOUT)).ok();

        let mut session = Session::new()
            .map_err(|e| BackupError::ProviderFailure(format!("sftp session init failed: {e}")))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| BackupError::ProviderFailure(format!("sftp handshake failed: {e}")))?;

        match &self.auth {
            SftpAuth::Password(password) => session
                .userauth_password(&self.username, password)
                .map_err(|e| BackupError::ProviderFailure(format!("sftp auth failed: {e}")))?,
            SftpAuth::PrivateKey {
                key_material,
                passphrase,
            } => session
                .userauth_pubkey_memory(&self.username, None, key_material, passphrase.as_deref())
                .map_err(|e| BackupError::ProviderFailure(format!("sftp auth failed: {e}")))?,
        }

        if !session.authenticated() {
            return Err(BackupError::ProviderFailure(
                "sftp authentication did not succeed".into(),
            ));
        }

        let sftp = session
            .sftp()
            .map_err(|e| BackupError::ProviderFailure(format!("sftp channel open failed: {e}")))?;
        Ok((session, sftp))
    }

    fn ensure_dir(sftp: &ssh2::Sftp, path: &Path) -> Result<()> {
        let mut current = PathBuf::new();
        for component in path.components() {
            current.push(component);
            if sftp.stat(&current).is_err() {
                sftp.mkdir(&current, 0o755).map_err(|e| {
                    BackupError::ProviderFailure(format!(
                        "sftp mkdir {} failed: {e}",
                        current.display()
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn walk_dir(sftp: &ssh2::Sftp, dir: &Path, rel_prefix: &str, out: &mut Vec<(String, PathBuf, DateTime<Utc>, u64)>) -> Result<()> {
        let entries = match sftp.readdir(dir) {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        for (path, stat) in entries {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if name == "." || name == ".." {
                continue;
            }
            let rel = if rel_prefix.is_empty() {
                name.clone()
            } else {
                format!("{rel_prefix}/{name}")
            };
            if stat.is_dir() {
                Self::walk_dir(sftp, &path, &rel, out)?;
            } else {
                let mtime = stat
                    .mtime
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0))
                    .unwrap_or_else(Utc::now);
                out.push((rel, path, mtime, stat.size.unwrap_or(0)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for SftpProvider {
    fn name(&self) -> &str {
        "sftp"
    }

    async fn list_backups(&self, prefix: &str) -> Result<Vec<StoredBackup>> {
        let provider = self.clone();
        let prefix = prefix.to_string();
        tokio::task::spawn_blocking(move || {
            let (_session, sftp) = provider.connect()?;
            let root = PathBuf::from(&provider.base_path);
            let mut entries = Vec::new();
            Self::walk_dir(&sftp, &root, "", &mut entries)?;
            let mut backups: Vec<StoredBackup> = entries
                .into_iter()
                .filter(|(rel, ..)| rel.starts_with(&prefix))
                .map(|(rel, _path, mtime, size)| StoredBackup {
                    id: rel.clone(),
                    name: Path::new(&rel)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or(rel),
                    created_at: mtime,
                    size: Some(size),
                })
                .collect();
            backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(backups)
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("sftp listing task panicked: {e}")))?
    }

    async fn upload_backup(&self, local_path: &Path, dest_name: &str) -> Result<StoredBackup> {
        let provider = self.clone();
        let local_path = local_path.to_path_buf();
        let dest_name = dest_name.to_string();
        tokio::task::spawn_blocking(move || {
            let (_session, sftp) = provider.connect()?;
            let remote_path = PathBuf::from(&provider.base_path).join(&dest_name);
            if let Some(parent) = remote_path.parent() {
                Self::ensure_dir(&sftp, parent)?;
            }
            let mut data = Vec::new();
            fs::File::open(&local_path)?.read_to_end(&mut data)?;
            let mut remote_file = sftp.create(&remote_path).map_err(|e| {
                if e.code() == ssh2::ErrorCode::SFTP(3) {
                    BackupError::ProviderFailure(format!(
                        "permission denied writing {}",
                        remote_path.display()
                    ))
                } else {
                    BackupError::ProviderFailure(format!("sftp upload failed: {e}"))
                }
            })?;
            remote_file.write_all(&data)?;
            drop(remote_file);

            let stat = sftp
                .stat(&remote_path)
                .map_err(|e| BackupError::ProviderFailure(format!("sftp stat after upload failed: {e}")))?;
            let mtime = stat
                .mtime
                .and_then(|t| DateTime::<Utc>::from_timestamp(t as i64, 0))
                .unwrap_or_else(Utc::now);
            Ok(StoredBackup {
                id: dest_name.clone(),
                name: Path::new(&dest_name)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or(dest_name),
                created_at: mtime,
                size: stat.size,
            })
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("sftp upload task panicked: {e}")))?
    }

    async fn download_backup(&self, backup_id: &str, dest_path: &Path) -> Result<()> {
        self.check_backup_id(backup_id)?;
        let provider = self.clone();
        let backup_id = backup_id.to_string();
        let dest_path = dest_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let (_session, sftp) = provider.connect()?;
            let remote_path = PathBuf::from(&provider.base_path).join(&backup_id);
            let mut remote_file = sftp
                .open(&remote_path)
                .map_err(|e| BackupError::ProviderFailure(format!("sftp download failed: {e}")))?;
            let mut data = Vec::new();
            remote_file.read_to_end(&mut data)?;
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest_path, data)?;
            Ok::<_, BackupError>(())
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("sftp download task panicked: {e}")))?
    }

    async fn delete_backups(&self, backups: &[StoredBackup]) -> Result<()> {
        for backup in backups {
            self.check_backup_id(&backup.id)?;
        }
        let provider = self.clone();
        let ids: Vec<String> = backups.iter().map(|b| b.id.clone()).collect();
        tokio::task::spawn_blocking(move || {
            let (_session, sftp) = provider.connect()?;
            for id in ids {
                let remote_path = PathBuf::from(&provider.base_path).join(&id);
                match sftp.unlink(&remote_path) {
                    Ok(()) => {}
                    Err(e) if e.code() == ssh2::ErrorCode::SFTP(2) => {}
                    Err(e) => {
                        return Err(BackupError::ProviderFailure(format!(
                            "sftp delete of {} failed: {e}",
                            remote_path.display()
                        )))
                    }
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| BackupError::ProviderFailure(format!("sftp delete task panicked: {e}")))?
    }

    async fn validate_backup_id(&self, backup_id: &str) -> Result<()> {
        self.check_backup_id(backup_id)
    }
}

impl SftpProvider {
    fn check_backup_id(&self, backup_id: &str) -> Result<()> {
        let full = format!("{}/{}", self.base_path, backup_id);
        if !full.starts_with(&self.base_path) || backup_id.contains("..") || backup_id.starts_with('/') {
            return Err(BackupError::Validation(format!(
                "invalid backup_id for sftp destination: {backup_id}"
            )));
        }
        Ok(())
    }
}
