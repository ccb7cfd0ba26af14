use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{check_status, run_with_timeout, DatabaseAdapter, DatabaseStats, TEST_CONNECTION_TIMEOUT};
use crate::error::{BackupError, CompatibilityWarning, Result};
use crate::models::DbType;
use crate::naming::artifact_stem;

pub struct MysqlAdapter {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl MysqlAdapter {
    fn base_command(&self, bin: &str) -> Command {
        let mut cmd = Command::new(bin);
        cmd.arg(format!("--host={}", self.host))
            .arg(format!("--port={}", self.port))
            .arg(format!("--user={}", self.user))
            .arg(format!("--password={}", self.password));
        cmd
    }
}

#[async_trait]
impl DatabaseAdapter for MysqlAdapter {
    fn db_type(&self) -> DbType {
        DbType::Mysql
    }

    async fn create_backup_to_temp(&self, temp_dir: &Path, compress: bool) -> Result<(String, PathBuf)> {
        let adapter = MysqlAdapter {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };
        let temp_dir = temp_dir.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(String, PathBuf)> {
            let stem = artifact_stem(DbType::Mysql, chrono::Utc::now());
            let filename = if compress {
                format!("{stem}.sql.gz")
            } else {
                format!("{stem}.sql")
            };
            let dest = temp_dir.join(&filename);

            let mut cmd = adapter.base_command("mysqldump");
            cmd.arg("--single-transaction")
                .arg("--routines")
                .arg("--skip-comments")
                .arg(&adapter.database);
            let output = run_with_timeout(&mut cmd, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("mysqldump", &output)?;

            if compress {
                let file = File::create(&dest).map_err(BackupError::Io)?;
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&output.stdout).map_err(BackupError::Io)?;
                encoder.finish().map_err(BackupError::Io)?;
            } else {
                std::fs::write(&dest, &output.stdout).map_err(BackupError::Io)?;
            }
            Ok((filename, dest))
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "mysql".into(),
            message: e.to_string(),
        })?
    }

    async fn restore(&self, backup_path: &Path) -> Result<Vec<CompatibilityWarning>> {
        let adapter = MysqlAdapter {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };
        let backup_path = backup_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<Vec<CompatibilityWarning>> {
            let mut drop_recreate = adapter.base_command("mysql");
            drop_recreate.arg(&adapter.database).arg("-e").arg(format!(
                "DROP DATABASE IF EXISTS `{db}`; CREATE DATABASE `{db}`;",
                db = adapter.database
            ));
            let output = run_with_timeout(&mut drop_recreate, std::time::Duration::from_secs(120))?;
            check_status("mysql reset", &output)?;

            let file = File::open(&backup_path).map_err(BackupError::Io)?;
            let mut apply = adapter.base_command("mysql");
            apply.arg(&adapter.database).stdin(file);
            let output = run_with_timeout(&mut apply, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("mysql restore", &output)?;

            let mut warnings = Vec::new();
            let contents = std::fs::read_to_string(&backup_path).unwrap_or_default();
            if contents.contains("-- MariaDB dump") {
                warnings.push(CompatibilityWarning(
                    "backup produced by mariadb-dump restored into a MySQL target".to_string(),
                ));
            }
            Ok(warnings)
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "mysql".into(),
            message: e.to_string(),
        })?
    }

    async fn test_connection(&self) -> Result<()> {
        let mut cmd = self.base_command("mysql");
        cmd.arg(&self.database).arg("-e").arg("SELECT 1");
        let output = tokio::task::spawn_blocking(move || run_with_timeout(&mut cmd, TEST_CONNECTION_TIMEOUT))
            .await
            .map_err(|e| BackupError::AdapterFailure {
                adapter: "mysql".into(),
                message: e.to_string(),
            })??;
        check_status("mysql", &output)
    }

    async fn get_stats(&self) -> Result<DatabaseStats> {
        let adapter = MysqlAdapter {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };

        tokio::task::spawn_blocking(move || -> Result<DatabaseStats> {
            let mut cmd = adapter.base_command("mysql");
            cmd.arg(&adapter.database)
                .arg("-N")
                .arg("-B")
                .arg("-e")
                .arg("SHOW TABLES");
            let output = run_with_timeout(&mut cmd, TEST_CONNECTION_TIMEOUT)?;
            check_status("mysql", &output)?;
            let tables: Vec<String> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();

            let mut size_cmd = adapter.base_command("mysql");
            size_cmd.arg("-N").arg("-B").arg("-e").arg(format!(
                "SELECT ROUND(SUM(data_length + index_length) / 1024 / 1024, 2) FROM information_schema.tables WHERE table_schema = '{}'",
                adapter.database
            ));
            let size_output = run_with_timeout(&mut size_cmd, TEST_CONNECTION_TIMEOUT)?;
            let database_size_mb = String::from_utf8_lossy(&size_output.stdout).trim().parse::<f64>().ok();

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
            adapter: "mysql".into(),
            message: e.to_string(),
        })?
    }
}
