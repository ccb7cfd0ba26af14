use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use rusqlite::Connection;

use super::{DatabaseAdapter, DatabaseStats};
use crate::error::{BackupError, CompatibilityWarning, Result};
use crate::models::DbType;
use crate::naming::artifact_stem;

/// SQLite backups go through `rusqlite`'s online backup API rather than a
/// subprocess — there is no separate server process to shell out to.
pub struct SqliteAdapter {
    pub file_path: PathBuf,
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
    }

    async fn create_backup_to_temp(&self, temp_dir: &Path, compress: bool) -> Result<(String, PathBuf)> {
        let source_path = self.file_path.clone();
        let temp_dir = temp_dir.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(String, PathBuf)> {
            let stem = artifact_stem(DbType::Sqlite, chrono::Utc::now());
            let filename = if compress {
                format!("{stem}.db.gz")
            } else {
                format!("{stem}.db")
            };
            let dest = temp_dir.join(&filename);

            let source = Connection::open(&source_path).map_err(BackupError::Database)?;
            if compress {
                let raw_path = temp_dir.join(format!("{stem}.db"));
                let mut target = Connection::open(&raw_path).map_err(BackupError::Database)?;
                source
                    .backup(rusqlite::DatabaseName::Main, &mut target, None)
                    .map_err(BackupError::Database)?;
                drop(target);
                let raw = std::fs::read(&raw_path).map_err(BackupError::Io)?;
                std::fs::remove_file(&raw_path).map_err(BackupError::Io)?;
                let file = std::fs::File::create(&dest).map_err(BackupError::Io)?;
                let mut encoder = GzEncoder::new(file, Compression::default());
                use std::io::Write as _;
                encoder.write_all(&raw).map_err(BackupError::Io)?;
                encoder.finish().map_err(BackupError::Io)?;
            } else {
                let mut target = Connection::open(&dest).map_err(BackupError::Database)?;
                source
                    .backup(rusqlite::DatabaseName::Main, &mut target, None)
                    .map_err(BackupError::Database)?;
            }
            Ok((filename, dest))
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "sqlite".into(),
            message: e.to_string(),
        })?
    }

    async fn restore(&self, backup_path: &Path) -> Result<Vec<CompatibilityWarning>> {
        let source_path = backup_path.to_path_buf();
        let target_path = self.file_path.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<CompatibilityWarning>> {
            let source = Connection::open(&source_path).map_err(BackupError::Database)?;
            if target_path.exists() {
                std::fs::remove_file(&target_path).map_err(BackupError::Io)?;
            }
            let mut target = Connection::open(&target_path).map_err(BackupError::Database)?;
            source
                .backup(rusqlite::DatabaseName::Main, &mut target, None)
                .map_err(BackupError::Database)?;
            Ok(Vec::new())
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "sqlite".into(),
            message: e.to_string(),
        })?
    }

    async fn test_connection(&self) -> Result<()> {
        let path = self.file_path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let conn = Connection::open(&path).map_err(BackupError::Database)?;
            conn.query_row("SELECT 1", [], |_| Ok(())).map_err(BackupError::Database)?;
            Ok(())
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "sqlite".into(),
            message: e.to_string(),
        })?
    }

    async fn get_stats(&self) -> Result<DatabaseStats> {
        let path = self.file_path.clone();
        tokio::task::spawn_blocking(move || -> Result<DatabaseStats> {
            let conn = Connection::open(&path).map_err(BackupError::Database)?;
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'")
                .map_err(BackupError::Database)?;
            let tables: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .map_err(BackupError::Database)?
                .collect::<std::result::Result<_, _>>()
                .map_err(BackupError::Database)?;
            let database_size_mb = std::fs::metadata(&path)
                .ok()
                .map(|m| m.len() as f64 / (1024.0 * 1024.0));
            Ok(DatabaseStats {
                table_count: Some(tables.len() as u64),
                total_rows: None,
                database_size_mb,
                tables,
                labels: Vec::new(),
                relationship_types: Vec::new(),
            })
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "sqlite".into(),
            message: e.to_string(),
        })?
    }
}
