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

pub struct PostgresAdapter {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl PostgresAdapter {
    fn base_command(&self, bin: &str) -> Command {
        let mut cmd = Command::new(bin);
        cmd.env("PGPASSWORD", &self.password)
            .arg("-h")
            .arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-U")
            .arg(&self.user);
        cmd
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn db_type(&self) -> DbType {
        DbType::Postgresql
    }

    async fn create_backup_to_temp(&self, temp_dir: &Path, compress: bool) -> Result<(String, PathBuf)> {
        let host = self.host.clone();
        let port = self.port;
        let user = self.user.clone();
        let password = self.password.clone();
        let database = self.database.clone();
        let temp_dir = temp_dir.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(String, PathBuf)> {
            let stem = artifact_stem(DbType::Postgresql, chrono::Utc::now());
            let filename = if compress {
                format!("{stem}.sql.gz")
            } else {
                format!("{stem}.sql")
            };
            let dest = temp_dir.join(&filename);

            let mut cmd = Command::new("pg_dump");
            cmd.env("PGPASSWORD", &password)
                .arg("-h")
                .arg(&host)
                .arg("-p")
                .arg(port.to_string())
                .arg("-U")
                .arg(&user)
                .arg("--no-owner")
                .arg("--no-privileges")
                .arg(&database);
            let output = run_with_timeout(&mut cmd, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("pg_dump", &output)?;

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
            adapter: "postgresql".into(),
            message: e.to_string(),
        })?
    }

    async fn restore(&self, backup_path: &Path) -> Result<Vec<CompatibilityWarning>> {
        let host = self.host.clone();
        let port = self.port;
        let user = self.user.clone();
        let password = self.password.clone();
        let database = self.database.clone();
        let backup_path = backup_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<Vec<CompatibilityWarning>> {
            let adapter = PostgresAdapter {
                host,
                port,
                database: database.clone(),
                user,
                password,
            };

            let reset_sql = "DROP SCHEMA public CASCADE; CREATE SCHEMA public;";
            let mut reset = adapter.base_command("psql");
            reset.arg("-d").arg(&database).arg("-c").arg(reset_sql);
            let output = run_with_timeout(&mut reset, std::time::Duration::from_secs(120))?;
            check_status("postgresql reset", &output)?;

            let mut apply = adapter.base_command("psql");
            apply
                .arg("-d")
                .arg(&database)
                .arg("-v")
                .arg("ON_ERROR_STOP=0")
                .arg("-f")
                .arg(&backup_path);
            let output = run_with_timeout(&mut apply, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("postgresql restore", &output)?;

            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut warnings = Vec::new();
            for line in stderr.lines() {
                if line.contains("ERROR") {
                    warnings.push(CompatibilityWarning(line.trim().to_string()));
                }
            }
            Ok(warnings)
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "postgresql".into(),
            message: e.to_string(),
        })?
    }

    async fn test_connection(&self) -> Result<()> {
        let mut cmd = self.base_command("psql");
        cmd.arg("-d").arg(&self.database).arg("-c").arg("SELECT 1");
        let output = tokio::task::spawn_blocking(move || run_with_timeout(&mut cmd, TEST_CONNECTION_TIMEOUT))
            .await
            .map_err(|e| BackupError::AdapterFailure {
                adapter: "postgresql".into(),
                message: e.to_string(),
            })??;
        check_status("postgresql", &output)
    }

    async fn get_stats(&self) -> Result<DatabaseStats> {
        let host = self.host.clone();
        let port = self.port;
        let user = self.user.clone();
        let password = self.password.clone();
        let database = self.database.clone();

        tokio::task::spawn_blocking(move || -> Result<DatabaseStats> {
            let adapter = PostgresAdapter {
                host,
                port,
                database: database.clone(),
                user,
                password,
            };
            let mut cmd = adapter.base_command("psql");
            cmd.arg("-d")
                .arg(&database)
                .arg("-At")
                .arg("-c")
                .arg("SELECT tablename FROM pg_tables WHERE schemaname = 'public' ORDER BY tablename");
            let output = run_with_timeout(&mut cmd, TEST_CONNECTION_TIMEOUT)?;
            check_status("postgresql", &output)?;
            let tables: Vec<String> = String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();

            let mut size_cmd = adapter.base_command("psql");
            size_cmd
                .arg("-d")
                .arg(&database)
                .arg("-At")
                .arg("-c")
                .arg("SELECT pg_database_size(current_database())");
            let size_output = run_with_timeout(&mut size_cmd, TEST_CONNECTION_TIMEOUT)?;
            let database_size_mb = String::from_utf8_lossy(&size_output.stdout)
                .trim()
                .parse::<f64>()
                .ok()
                .map(|bytes| bytes / (1024.0 * 1024.0));

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
            adapter: "postgresql".into(),
            message: e.to_string(),
        })?
    }
}
