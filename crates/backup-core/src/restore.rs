//! Restore pipeline (C6, §4.6).

use std::io::Read as _;
use std::path::Path;

use crate::adapters::build_adapter;
use crate::crypto;
use crate::error::{BackupError, CompatibilityWarning, Result};
use crate::lock::OperationLock;
use crate::models::{DbType, DestinationType, LockOperation, RunStatus, Target, Trigger};
use crate::pipeline::build_provider;
use crate::store::Store;

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";
const CONFIRMATION_TOKEN: &str = "RESTORE";
const SNIFF_WINDOW: usize = 64 * 1024;

pub struct RestoreRequest {
    pub target_id: String,
    pub destination_id: String,
    pub backup_id: String,
    pub encryption_password: Option<String>,
    pub confirmation: String,
}

pub struct RestoreOutcome {
    pub status: RunStatus,
    pub warnings: Vec<CompatibilityWarning>,
}

/// Run the restore pipeline to completion. Acquires the restore slot of
/// the operation lock for its duration; rejects outright if a backup is
/// in flight.
pub async fn run_restore(store: &Store, lock: &OperationLock, request: RestoreRequest) -> Result<RestoreOutcome> {
    if request.confirmation != CONFIRMATION_TOKEN {
        return Err(BackupError::Validation(format!(
            "restore requires confirmation=\"{CONFIRMATION_TOKEN}\""
        )));
    }
    let _lock_guard = lock.acquire(LockOperation::Restore)?;

    let target = store.get_target(&request.target_id)?;
    let destination = store.get_destination(&request.destination_id)?;

    let audit = store.create_audit_event(
        "restore",
        Trigger::Manual,
        RunStatus::Started,
        Some((&target.id, &target.name)),
        Some((&destination.id, &destination.name)),
        None,
        None,
        None,
    )?;

    let result = execute_restore_steps(store, &target, &destination, &request).await;

    let status = if result.is_ok() { RunStatus::Success } else { RunStatus::Failed };
    let error_message = result.as_ref().err().map(|e| e.to_string());
    let _ = store.finish_audit_event(&audit.id, status, None, None, error_message.as_deref());

    result.map(|warnings| RestoreOutcome { status, warnings })
}

async fn execute_restore_steps(
    store: &Store,
    target: &Target,
    destination: &crate::models::Destination,
    request: &RestoreRequest,
) -> Result<Vec<CompatibilityWarning>> {
    let secrets = store.resolve_destination_secrets(&destination.id)?;
    let provider = build_provider(destination, secrets)?;
    provider.validate_backup_id(&request.backup_id).await?;

    let temp_dir = tempfile::tempdir()?;
    let downloaded_path = temp_dir.path().join("restore-artifact");
    provider.download_backup(&request.backup_id, &downloaded_path).await?;

    let mut restore_input = downloaded_path.clone();
    if crypto::is_encrypted_backup_file(&downloaded_path)? {
        let password = request
            .encryption_password
            .as_deref()
            .ok_or_else(|| BackupError::Validation("this artifact is encrypted; encryption_password is required".into()))?;
        let decrypted_path = temp_dir.path().join("restore-artifact.decrypted");
        crypto::decrypt_file(&downloaded_path, &decrypted_path, password)?;
        restore_input = decrypted_path;
    }

    validate_compatibility(target.db_type, destination.destination_type, &restore_input, &request.backup_id)?;

    let target_secrets = store.resolve_target_secrets(&target.id)?;
    let adapter = build_adapter(target, target_secrets)?;
    let warnings = adapter.restore(&restore_input).await?;
    Ok(warnings)
}

/// Conservative, snippet-based compatibility check (§4.6 step 4): sniff
/// the first [`SNIFF_WINDOW`] bytes (transparently gunzipped) for tokens
/// characteristic of the target's db_type, plus a filename-suffix check.
/// The suffix check only applies to non-Drive destinations — a Google
/// Drive `backup_id` is an opaque file id, never a dump filename.
fn validate_compatibility(db_type: DbType, destination_type: DestinationType, path: &Path, backup_id: &str) -> Result<()> {
    if destination_type != DestinationType::GoogleDrive {
        check_suffix(db_type, backup_id)?;
    }

    let snippet = read_snippet(path)?;
    match db_type {
        DbType::Sqlite => {
            if !snippet.starts_with(SQLITE_MAGIC) {
                return Err(BackupError::CompatibilityReject(
                    "artifact does not begin with the SQLite magic header".into(),
                ));
            }
        }
        DbType::Neo4j => {
            let text = String::from_utf8_lossy(&snippet);
            let has_cypher_token = text.contains("MATCH (") || text.contains("DETACH DELETE") || text.contains("CALL db.");
            if !has_cypher_token {
                return Err(BackupError::CompatibilityReject(
                    "artifact does not contain recognizable Cypher statements".into(),
                ));
            }
        }
        DbType::Postgresql | DbType::Mysql => {
            let text = String::from_utf8_lossy(&snippet);
            let has_sql_token = text.contains("CREATE TABLE") || text.contains("INSERT INTO");
            if !has_sql_token {
                return Err(BackupError::CompatibilityReject(
                    "artifact does not contain recognizable SQL statements".into(),
                ));
            }
            let looks_postgres = text.contains("pg_dump") || text.contains("PostgreSQL database dump");
            let looks_mariadb = text.to_lowercase().contains("mariadb");
            if db_type == DbType::Postgresql && looks_mariadb {
                return Err(BackupError::CompatibilityReject(
                    "artifact looks like a MySQL/MariaDB dump restored into a postgresql target".into(),
                ));
            }
            if db_type == DbType::Mysql && looks_postgres {
                return Err(BackupError::CompatibilityReject(
                    "artifact looks like a PostgreSQL dump restored into a mysql target".into(),
                ));
            }
        }
    }
    Ok(())
}

fn check_suffix(db_type: DbType, backup_id: &str) -> Result<()> {
    let stripped = backup_id.strip_suffix(".enc").unwrap_or(backup_id);
    let ok = match db_type {
        DbType::Sqlite => stripped.ends_with(".db") || stripped.ends_with(".db.gz"),
        DbType::Neo4j => stripped.ends_with(".cypher") || stripped.ends_with(".cypher.gz"),
        DbType::Postgresql | DbType::Mysql => stripped.ends_with(".sql") || stripped.ends_with(".sql.gz"),
    };
    if ok {
        Ok(())
    } else {
        Err(BackupError::CompatibilityReject(format!(
            "filename {backup_id} does not match the expected suffix for {db_type}"
        )))
    }
}

fn read_snippet(path: &Path) -> Result<Vec<u8>> {
    let mut file = std::fs::File::open(path).map_err(BackupError::Io)?;
    let mut head = vec![0u8; SNIFF_WINDOW.min(2)];
    let n = file.read(&mut head).map_err(BackupError::Io)?;
    head.truncate(n);

    if head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b {
        let mut file = std::fs::File::open(path).map_err(BackupError::Io)?;
        let mut decoder = flate2::read::GzDecoder::new(&mut file);
        let mut buf = vec![0u8; SNIFF_WINDOW];
        let n = decoder.read(&mut buf).unwrap_or(0);
        buf.truncate(n);
        return Ok(buf);
    }

    let mut file = std::fs::File::open(path).map_err(BackupError::Io)?;
    let mut buf = vec![0u8; SNIFF_WINDOW];
    let n = file.read(&mut buf).map_err(BackupError::Io)?;
    buf.truncate(n);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn sqlite_requires_magic_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.db");
        std::fs::write(&path, b"not a sqlite file").unwrap();
        let err = validate_compatibility(DbType::Sqlite, DestinationType::Local, &path, "bad.db").unwrap_err();
        assert!(matches!(err, BackupError::CompatibilityReject(_)));
    }

    #[test]
    fn sqlite_accepts_real_magic_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("good.db");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(SQLITE_MAGIC).unwrap();
        f.write_all(b"rest of file").unwrap();
        validate_compatibility(DbType::Sqlite, DestinationType::Local, &path, "good.db").unwrap();
    }

    #[test]
    fn neo4j_rejects_non_cypher_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cypher");
        std::fs::write(&path, b"CREATE TABLE t (id int);").unwrap();
        let err = validate_compatibility(DbType::Neo4j, DestinationType::Local, &path, "bad.cypher").unwrap_err();
        assert!(matches!(err, BackupError::CompatibilityReject(_)));
    }

    #[test]
    fn suffix_mismatch_is_rejected_before_content_sniff() {
        let err = check_suffix(DbType::Postgresql, "dump.cypher.gz").unwrap_err();
        assert!(matches!(err, BackupError::CompatibilityReject(_)));
    }

    #[test]
    fn suffix_check_is_skipped_for_google_drive_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact");
        std::fs::write(&path, b"CREATE TABLE t (id int);\nINSERT INTO t VALUES (1);").unwrap();
        validate_compatibility(DbType::Postgresql, DestinationType::GoogleDrive, &path, "1AbCdEfGhIjKlMnOpQrStUvWxYz").unwrap();
    }

    #[test]
    fn mariadb_dump_rejected_for_postgres_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, b"-- MariaDB dump\nCREATE TABLE t (id int);\nINSERT INTO t VALUES (1);").unwrap();
        let err = validate_compatibility(DbType::Postgresql, DestinationType::Local, &path, "dump.sql").unwrap_err();
        assert!(matches!(err, BackupError::CompatibilityReject(_)));
    }
}
