//! Database adapter contract (external collaborator, C10).
//!
//! One adapter per [`DbType`], each shelling out to the vendor's native
//! tool via `std::process::Command`, dispatched through
//! `tokio::task::spawn_blocking` so the pipeline's async caller never
//! blocks on a subprocess.

mod mysql;
mod neo4j;
mod postgres;
mod sqlite;

pub use mysql::MysqlAdapter;
pub use neo4j::Neo4jAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{BackupError, CompatibilityWarning, Result};
use crate::models::{DbType, Target, TargetConfig};

pub const TEST_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Statistics reported by `get_stats`; fields are populated per db_type
/// (`tables` for SQL, `labels`/`relationship_types` for Neo4j).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DatabaseStats {
    pub table_count: Option<u64>,
    pub total_rows: Option<u64>,
    pub database_size_mb: Option<f64>,
    pub tables: Vec<String>,
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    fn db_type(&self) -> DbType;

    /// Produce a backup artifact under `temp_dir`. Returns the canonical
    /// filename (`backup_<db_type>_<timestamp>.<ext>[.gz]`) and its path.
    async fn create_backup_to_temp(&self, temp_dir: &Path, compress: bool) -> Result<(String, PathBuf)>;

    /// Drop all user objects in the target, then apply `backup_path`.
    /// Returns non-fatal compatibility warnings (e.g. MariaDB dump into a
    /// MySQL target).
    async fn restore(&self, backup_path: &Path) -> Result<Vec<CompatibilityWarning>>;

    /// Must complete within [`TEST_CONNECTION_TIMEOUT`] or fail.
    async fn test_connection(&self) -> Result<()>;

    async fn get_stats(&self) -> Result<DatabaseStats>;
}

/// Build the adapter for `target`, pulling credentials out of its
/// decrypted `secrets` document (password / bolt user+password / etc).
pub fn build_adapter(target: &Target, secrets: Option<Value>) -> Result<Box<dyn DatabaseAdapter>> {
    let secrets = secrets.unwrap_or(Value::Null);
    match &target.config {
        TargetConfig::Postgresql {
            host,
            port,
            database,
            user,
        } => Ok(Box::new(PostgresAdapter {
            host: host.clone(),
            port: *port,
            database: database.clone(),
            user: user.clone(),
            password: secret_str(&secrets, "password").unwrap_or_default(),
        })),
        TargetConfig::Mysql {
            host,
            port,
            database,
            user,
        } => Ok(Box::new(MysqlAdapter {
            host: host.clone(),
            port: *port,
            database: database.clone(),
            user: user.clone(),
            password: secret_str(&secrets, "password").unwrap_or_default(),
        })),
        TargetConfig::Sqlite { file_path } => Ok(Box::new(SqliteAdapter {
            file_path: PathBuf::from(file_path),
        })),
        TargetConfig::Neo4j { bolt_url, database } => Ok(Box::new(Neo4jAdapter {
            bolt_url: bolt_url.clone(),
            database: database.clone(),
            user: secret_str(&secrets, "user").unwrap_or_else(|| "neo4j".to_string()),
            password: secret_str(&secrets, "password").unwrap_or_default(),
        })),
    }
}

fn secret_str(secrets: &Value, key: &str) -> Option<String> {
    secrets.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Run `cmd` to completion, killing it if it runs longer than `timeout`.
/// Polling rather than a blocking `wait()` so a hung vendor tool cannot
/// wedge the worker thread past the deadline.
pub(crate) fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<Output> {
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(BackupError::Io)?;
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(_status) = child.try_wait().map_err(BackupError::Io)? {
            return child.wait_with_output().map_err(BackupError::Io);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackupError::ProviderFailure(
                "adapter subprocess exceeded its timeout".into(),
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

pub(crate) fn check_status(adapter: &str, output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let snippet: String = stderr.chars().take(2000).collect();
    Err(BackupError::AdapterFailure {
        adapter: adapter.to_string(),
        message: snippet,
    })
}
