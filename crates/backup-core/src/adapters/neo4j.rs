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

/// Drives `cypher-shell`, exporting via APOC's `apoc.export.cypher.all`
/// and restoring by replaying the generated statement file.
pub struct Neo4jAdapter {
    pub bolt_url: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Neo4jAdapter {
    fn base_command(&self) -> Command {
        let mut cmd = Command::new("cypher-shell");
        cmd.arg("-a")
            .arg(&self.bolt_url)
            .arg("-u")
            .arg(&self.user)
            .arg("-p")
            .arg(&self.password)
            .arg("-d")
            .arg(&self.database)
            .arg("--format")
            .arg("plain");
        cmd
    }
}

#[async_trait]
impl DatabaseAdapter for Neo4jAdapter {
    fn db_type(&self) -> DbType {
        DbType::Neo4j
    }

    async fn create_backup_to_temp(&self, temp_dir: &Path, compress: bool) -> Result<(String, PathBuf)> {
        let adapter = Neo4jAdapter {
            bolt_url: self.bolt_url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };
        let temp_dir = temp_dir.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<(String, PathBuf)> {
            let stem = artifact_stem(DbType::Neo4j, chrono::Utc::now());
            let filename = if compress {
                format!("{stem}.cypher.gz")
            } else {
                format!("{stem}.cypher")
            };
            let dest = temp_dir.join(&filename);
            let export_path = temp_dir.join(format!("{stem}-apoc-export.cypher"));

            let mut export_cmd = adapter.base_command();
            export_cmd.arg(
                format!(
                    "CALL apoc.export.cypher.all('{}', {{format: 'cypher-shell', useOptimizations: {{type: 'UNWIND_BATCH'}}}})",
                    export_path.display()
                ),
            );
            let output = run_with_timeout(&mut export_cmd, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("neo4j export", &output)?;

            let raw = std::fs::read(&export_path).map_err(BackupError::Io)?;
            let _ = std::fs::remove_file(&export_path);

            if compress {
                let file = File::create(&dest).map_err(BackupError::Io)?;
                let mut encoder = GzEncoder::new(file, Compression::default());
                encoder.write_all(&raw).map_err(BackupError::Io)?;
                encoder.finish().map_err(BackupError::Io)?;
            } else {
                std::fs::write(&dest, &raw).map_err(BackupError::Io)?;
            }
            Ok((filename, dest))
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "neo4j".into(),
            message: e.to_string(),
        })?
    }

    async fn restore(&self, backup_path: &Path) -> Result<Vec<CompatibilityWarning>> {
        let adapter = Neo4jAdapter {
            bolt_url: self.bolt_url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };
        let backup_path = backup_path.to_path_buf();

        tokio::task::spawn_blocking(move || -> Result<Vec<CompatibilityWarning>> {
            let mut wipe = adapter.base_command();
            wipe.arg("MATCH (n) CALL { WITH n DETACH DELETE n } IN TRANSACTIONS OF 10000 ROWS");
            let output = run_with_timeout(&mut wipe, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("neo4j reset", &output)?;

            let file = File::open(&backup_path).map_err(BackupError::Io)?;
            let mut replay = adapter.base_command();
            replay.stdin(file);
            let output = run_with_timeout(&mut replay, std::time::Duration::from_secs(6 * 60 * 60))?;
            check_status("neo4j restore", &output)?;
            Ok(Vec::new())
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "neo4j".into(),
            message: e.to_string(),
        })?
    }

    async fn test_connection(&self) -> Result<()> {
        let mut cmd = self.base_command();
        cmd.arg("RETURN 1");
        let output = tokio::task::spawn_blocking(move || run_with_timeout(&mut cmd, TEST_CONNECTION_TIMEOUT))
            .await
            .map_err(|e| BackupError::AdapterFailure {
                adapter: "neo4j".into(),
                message: e.to_string(),
            })??;
        check_status("neo4j", &output)
    }

    async fn get_stats(&self) -> Result<DatabaseStats> {
        let adapter = Neo4jAdapter {
            bolt_url: self.bolt_url.clone(),
            database: self.database.clone(),
            user: self.user.clone(),
            password: self.password.clone(),
        };

        tokio::task::spawn_blocking(move || -> Result<DatabaseStats> {
            let mut labels_cmd = adapter.base_command();
            labels_cmd.arg("CALL db.labels() YIELD label RETURN label");
            let labels_output = run_with_timeout(&mut labels_cmd, TEST_CONNECTION_TIMEOUT)?;
            check_status("neo4j", &labels_output)?;
            let labels = parse_plain_column(&labels_output.stdout);

            let mut rel_cmd = adapter.base_command();
            rel_cmd.arg("CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType");
            let rel_output = run_with_timeout(&mut rel_cmd, TEST_CONNECTION_TIMEOUT)?;
            check_status("neo4j", &rel_output)?;
            let relationship_types = parse_plain_column(&rel_output.stdout);

            let mut count_cmd = adapter.base_command();
            count_cmd.arg("MATCH (n) RETURN count(n)");
            let count_output = run_with_timeout(&mut count_cmd, TEST_CONNECTION_TIMEOUT)?;
            let total_rows = parse_plain_column(&count_output.stdout)
                .first()
                .and_then(|s| s.parse::<u64>().ok());

            Ok(DatabaseStats {
                table_count: None,
                total_rows,
                database_size_mb: None,
                tables: Vec::new(),
                labels,
                relationship_types,
            })
        })
        .await
        .map_err(|e| BackupError::AdapterFailure {
            adapter: "neo4j".into(),
            message: e.to_string(),
        })?
    }
}

/// `cypher-shell --format plain` output is the column header followed by
/// one quoted value per line.
fn parse_plain_column(stdout: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .skip(1)
        .map(|l| l.trim().trim_matches('"').to_string())
        .filter(|l| !l.is_empty())
        .collect()
}
