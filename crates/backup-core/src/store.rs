//! Configuration store (C1) and audit/run history (C8).
//!
//! A pooled SQLite database, migrated at startup by a `user_version`-gated
//! migration runner — the same mechanism the teacher's `db` module uses
//! for its own schema. Secrets are encrypted at rest with a key derived
//! from the process-wide master key; read paths never return decrypted
//! secrets, only `secrets_present`.

use std::path::Path;

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{BackupError, Result};
use crate::models::{
    AuditEvent, Destination, DestinationConfig, Run, RunStatus, Schedule, Target, TargetConfig,
    Trigger,
};
use crate::secrets::SecretCipher;

const MIGRATION_VERSION: i64 = 1;
const BUILT_IN_LOCAL_DESTINATION_ID: &str = "local";

pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    cipher: Option<SecretCipher>,
}

fn now_str(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackupError::Database(rusqlite::Error::InvalidColumnType(
            0,
            format!("bad timestamp {s}: {e}"),
            rusqlite::types::Type::Text,
        )))
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Store {
    /// Opens (creating if absent) the config store at `db_path`. `backups_dir`
    /// becomes the built-in `local` destination's storage path — callers pass
    /// [`crate::config::EngineConfig::backups_dir`] so it tracks `BACKUP_DATA_DIR`.
    pub fn open(db_path: &Path, master_key: Option<&str>, backups_dir: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::new(manager)?;
        let store = Self {
            pool,
            cipher: master_key.map(SecretCipher::from_passphrase),
        };
        store.run_migrations()?;
        store.ensure_local_destination(backups_dir)?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool, cipher: None };
        store.run_migrations()?;
        store.ensure_local_destination(Path::new("./backups"))?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.pool.get()?;
        let current: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if current >= MIGRATION_VERSION {
            return Ok(());
        }
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS backup_targets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                db_type TEXT NOT NULL,
                config TEXT NOT NULL,
                config_encrypted TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backup_destinations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                destination_type TEXT NOT NULL,
                config TEXT NOT NULL,
                config_encrypted TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backup_schedules (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                target_id TEXT NOT NULL REFERENCES backup_targets(id) ON DELETE CASCADE,
                enabled INTEGER NOT NULL DEFAULT 1,
                interval_seconds INTEGER NOT NULL DEFAULT 86400,
                next_run_at TEXT,
                last_run_at TEXT,
                retention TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backup_schedule_destinations (
                schedule_id TEXT NOT NULL REFERENCES backup_schedules(id) ON DELETE CASCADE,
                destination_id TEXT NOT NULL REFERENCES backup_destinations(id) ON DELETE CASCADE,
                PRIMARY KEY (schedule_id, destination_id)
            );

            CREATE TABLE IF NOT EXISTS backup_runs (
                id TEXT PRIMARY KEY,
                schedule_id TEXT REFERENCES backup_schedules(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'started',
                started_at TEXT NOT NULL,
                finished_at TEXT,
                backup_filename TEXT,
                details TEXT,
                error_message TEXT
            );

            CREATE TABLE IF NOT EXISTS audit_events (
                id TEXT PRIMARY KEY,
                operation TEXT NOT NULL,
                trigger TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'success',
                started_at TEXT NOT NULL,
                finished_at TEXT,
                target_id TEXT,
                target_name TEXT,
                destination_id TEXT,
                destination_name TEXT,
                schedule_id TEXT,
                schedule_name TEXT,
                backup_id TEXT,
                backup_name TEXT,
                run_id TEXT,
                user_id TEXT,
                user_name TEXT,
                details TEXT,
                error_message TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_runs_schedule ON backup_runs(schedule_id);
            CREATE INDEX IF NOT EXISTS idx_audit_target ON audit_events(target_id);
            CREATE INDEX IF NOT EXISTS idx_audit_operation ON audit_events(operation);
            ",
        )?;
        conn.pragma_update(None, "user_version", MIGRATION_VERSION)?;
        Ok(())
    }

    fn ensure_local_destination(&self, backups_dir: &Path) -> Result<()> {
        let conn = self.pool.get()?;
        let exists: Option<String> = conn
            .query_row(
                "SELECT id FROM backup_destinations WHERE id = ?1",
                params![BUILT_IN_LOCAL_DESTINATION_ID],
                |r| r.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(());
        }
        let now = now_str(Utc::now());
        let config = serde_json::json!({
            "destination_type": "local",
            "path": backups_dir.to_string_lossy(),
        });
        conn.execute(
            "INSERT INTO backup_destinations
                (id, name, destination_type, config, config_encrypted, is_active, created_at, updated_at)
             VALUES (?1, 'local', 'local', ?2, NULL, 1, ?3, ?3)",
            params![
                BUILT_IN_LOCAL_DESTINATION_ID,
                serde_json::to_string(&config)?,
                now
            ],
        )?;
        Ok(())
    }

    fn cipher(&self) -> Result<&SecretCipher> {
        self.cipher
            .as_ref()
            .ok_or_else(|| BackupError::EncryptionNotConfigured(
                "MASTER_ENCRYPTION_KEY is not configured".into(),
            ))
    }

    /// Replaces a retention policy's plaintext `encryption_password` with an
    /// encrypted blob before it is persisted, mirroring how target and
    /// destination secrets are handled. A no-op when no password is set.
    fn encrypt_retention_password(&self, mut retention: crate::models::RetentionPolicy) -> Result<crate::models::RetentionPolicy> {
        if let Some(password) = retention.encryption_password.take() {
            let blob = self.cipher()?.encrypt(&serde_json::json!({ "password": password }))?;
            retention.encryption_password = Some(blob);
        }
        Ok(retention)
    }

    /// Reverses [`Self::encrypt_retention_password`] after a row load.
    fn decrypt_retention_password(&self, mut retention: crate::models::RetentionPolicy) -> Result<crate::models::RetentionPolicy> {
        if let Some(blob) = retention.encryption_password.take() {
            let value = self.cipher()?.decrypt(&blob)?;
            retention.encryption_password = value.get("password").and_then(|v| v.as_str()).map(str::to_string);
        }
        Ok(retention)
    }

    // ---- targets ----------------------------------------------------

    pub fn create_target(
        &self,
        name: &str,
        config: TargetConfig,
        secrets: Option<serde_json::Value>,
    ) -> Result<Target> {
        let conn = self.pool.get()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM backup_targets WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(BackupError::Conflict(format!("target name already exists: {name}")));
        }

        let config_encrypted = match secrets {
            Some(s) => Some(self.cipher()?.encrypt(&s)?),
            None => None,
        };

        let id = new_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO backup_targets
                (id, name, db_type, config, config_encrypted, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                id,
                name,
                config.db_type().as_str(),
                serde_json::to_string(&config)?,
                config_encrypted,
                now_str(now)
            ],
        )?;

        Ok(Target {
            id,
            name: name.to_string(),
            db_type: config.db_type(),
            config,
            secrets_present: config_encrypted.is_some(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_target(&self, id: &str) -> Result<Target> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, config, config_encrypted, is_active, created_at, updated_at
             FROM backup_targets WHERE id = ?1",
            params![id],
            row_to_target,
        )
        .optional()?
        .ok_or_else(|| BackupError::NotFound(format!("target not found: {id}")))
    }

    pub fn list_targets(&self) -> Result<Vec<Target>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, config, config_encrypted, is_active, created_at, updated_at
             FROM backup_targets ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_target)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(BackupError::Database)
    }

    pub fn update_target(
        &self,
        id: &str,
        config: Option<TargetConfig>,
        secrets: Option<serde_json::Value>,
        is_active: Option<bool>,
    ) -> Result<Target> {
        let mut target = self.get_target(id)?;
        if let Some(cfg) = config {
            target.config = cfg;
            target.db_type = target.config.db_type();
        }
        if let Some(active) = is_active {
            target.is_active = active;
        }
        let config_encrypted = match secrets {
            Some(s) => Some(self.cipher()?.encrypt(&s)?),
            None => None,
        };

        let conn = self.pool.get()?;
        let now = Utc::now();
        if let Some(blob) = &config_encrypted {
            conn.execute(
                "UPDATE backup_targets SET config = ?1, config_encrypted = ?2, db_type = ?3, is_active = ?4, updated_at = ?5 WHERE id = ?6",
                params![serde_json::to_string(&target.config)?, blob, target.db_type.as_str(), target.is_active as i64, now_str(now), id],
            )?;
        } else {
            conn.execute(
                "UPDATE backup_targets SET config = ?1, db_type = ?2, is_active = ?3, updated_at = ?4 WHERE id = ?5",
                params![serde_json::to_string(&target.config)?, target.db_type.as_str(), target.is_active as i64, now_str(now), id],
            )?;
        }
        target.updated_at = now;
        Ok(target)
    }

    pub fn delete_target(&self, id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let n = conn.execute("DELETE FROM backup_targets WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(BackupError::NotFound(format!("target not found: {id}")));
        }
        Ok(())
    }

    pub fn resolve_target_secrets(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.pool.get()?;
        let blob: Option<String> = conn
            .query_row(
                "SELECT config_encrypted FROM backup_targets WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| BackupError::NotFound(format!("target not found: {id}")))?;
        match blob {
            Some(b) => Ok(Some(self.cipher()?.decrypt(&b)?)),
            None => Ok(None),
        }
    }

    // ---- destinations -------------------------------------------------

    pub fn create_destination(
        &self,
        name: &str,
        config: DestinationConfig,
        secrets: Option<serde_json::Value>,
    ) -> Result<Destination> {
        let conn = self.pool.get()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM backup_destinations WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(BackupError::Conflict(format!(
                "destination name already exists: {name}"
            )));
        }
        let config_encrypted = match secrets {
            Some(s) => Some(self.cipher()?.encrypt(&s)?),
            None => None,
        };
        let id = new_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO backup_destinations
                (id, name, destination_type, config, config_encrypted, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                id,
                name,
                config.destination_type().as_str(),
                serde_json::to_string(&config)?,
                config_encrypted,
                now_str(now)
            ],
        )?;
        Ok(Destination {
            id,
            name: name.to_string(),
            destination_type: config.destination_type(),
            config,
            secrets_present: config_encrypted.is_some(),
            is_active: true,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_destination(&self, id: &str) -> Result<Destination> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, name, config, config_encrypted, is_active, created_at, updated_at
             FROM backup_destinations WHERE id = ?1",
            params![id],
            row_to_destination,
        )
        .optional()?
        .ok_or_else(|| BackupError::NotFound(format!("destination not found: {id}")))
    }

    pub fn list_destinations(&self) -> Result<Vec<Destination>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, config, config_encrypted, is_active, created_at, updated_at
             FROM backup_destinations ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_destination)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(BackupError::Database)
    }

    pub fn update_destination(
        &self,
        id: &str,
        config: Option<DestinationConfig>,
        secrets: Option<serde_json::Value>,
        is_active: Option<bool>,
    ) -> Result<Destination> {
        let mut destination = self.get_destination(id)?;
        if let Some(cfg) = config {
            destination.config = cfg;
            destination.destination_type = destination.config.destination_type();
        }
        if let Some(active) = is_active {
            destination.is_active = active;
        }
        let config_encrypted = match secrets {
            Some(s) => Some(self.cipher()?.encrypt(&s)?),
            None => None,
        };

        let conn = self.pool.get()?;
        let now = Utc::now();
        if let Some(blob) = &config_encrypted {
            conn.execute(
                "UPDATE backup_destinations SET config = ?1, config_encrypted = ?2, destination_type = ?3, is_active = ?4, updated_at = ?5 WHERE id = ?6",
                params![
                    serde_json::to_string(&destination.config)?,
                    blob,
                    destination.destination_type.as_str(),
                    destination.is_active as i64,
                    now_str(now),
                    id
                ],
            )?;
        } else {
            conn.execute(
                "UPDATE backup_destinations SET config = ?1, destination_type = ?2, is_active = ?3, updated_at = ?4 WHERE id = ?5",
                params![
                    serde_json::to_string(&destination.config)?,
                    destination.destination_type.as_str(),
                    destination.is_active as i64,
                    now_str(now),
                    id
                ],
            )?;
        }
        destination.updated_at = now;
        Ok(destination)
    }

    pub fn delete_destination(&self, id: &str) -> Result<()> {
        if id == BUILT_IN_LOCAL_DESTINATION_ID {
            return Err(BackupError::Validation(
                "the built-in local destination cannot be deleted".into(),
            ));
        }
        let conn = self.pool.get()?;
        let n = conn.execute("DELETE FROM backup_destinations WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(BackupError::NotFound(format!("destination not found: {id}")));
        }
        Ok(())
    }

    pub fn resolve_destination_secrets(&self, id: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.pool.get()?;
        let blob: Option<String> = conn
            .query_row(
                "SELECT config_encrypted FROM backup_destinations WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| BackupError::NotFound(format!("destination not found: {id}")))?;
        match blob {
            Some(b) => Ok(Some(self.cipher()?.decrypt(&b)?)),
            None => Ok(None),
        }
    }

    // ---- schedules ------------------------------------------------------

    pub fn create_schedule(
        &self,
        name: &str,
        target_id: &str,
        destination_ids: &[String],
        interval_seconds: i64,
        retention: crate::models::RetentionPolicy,
        enabled: bool,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Schedule> {
        if destination_ids.is_empty() {
            return Err(BackupError::Validation(
                "a schedule requires at least one destination".into(),
            ));
        }
        let conn = self.pool.get()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM backup_schedules WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(BackupError::Conflict(format!("schedule name already exists: {name}")));
        }

        let id = new_id();
        let now = Utc::now();
        let next = if enabled { next_run_at.or(Some(now)) } else { None };
        let stored_retention = self.encrypt_retention_password(retention.clone())?;
        conn.execute(
            "INSERT INTO backup_schedules
                (id, name, target_id, enabled, interval_seconds, next_run_at, last_run_at, retention, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?8)",
            params![
                id,
                name,
                target_id,
                enabled as i64,
                interval_seconds,
                next.map(now_str),
                serde_json::to_string(&stored_retention)?,
                now_str(now)
            ],
        )?;
        for dest_id in destination_ids {
            conn.execute(
                "INSERT INTO backup_schedule_destinations (schedule_id, destination_id) VALUES (?1, ?2)",
                params![id, dest_id],
            )?;
        }

        Ok(Schedule {
            id,
            name: name.to_string(),
            target_id: target_id.to_string(),
            destination_ids: destination_ids.to_vec(),
            enabled,
            interval_seconds,
            next_run_at: next,
            last_run_at: None,
            retention,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_schedule(&self, id: &str) -> Result<Schedule> {
        let conn = self.pool.get()?;
        let mut schedule = conn
            .query_row(
                "SELECT id, name, target_id, enabled, interval_seconds, next_run_at, last_run_at,
                        retention, created_at, updated_at
                 FROM backup_schedules WHERE id = ?1",
                params![id],
                row_to_schedule,
            )
            .optional()?
            .ok_or_else(|| BackupError::NotFound(format!("schedule not found: {id}")))?;
        schedule.destination_ids = self.schedule_destination_ids(&conn, id)?;
        schedule.retention = self.decrypt_retention_password(schedule.retention)?;
        Ok(schedule)
    }

    fn schedule_destination_ids(&self, conn: &rusqlite::Connection, schedule_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT destination_id FROM backup_schedule_destinations WHERE schedule_id = ?1",
        )?;
        let rows = stmt.query_map(params![schedule_id], |r| r.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(BackupError::Database)
    }

    pub fn list_schedules(&self) -> Result<Vec<Schedule>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, target_id, enabled, interval_seconds, next_run_at, last_run_at,
                    retention, created_at, updated_at
             FROM backup_schedules ORDER BY name",
        )?;
        let rows = stmt.query_map([], row_to_schedule)?;
        let mut schedules = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackupError::Database)?;
        for schedule in &mut schedules {
            schedule.destination_ids = self.schedule_destination_ids(&conn, &schedule.id)?;
            schedule.retention = self.decrypt_retention_password(schedule.retention.clone())?;
        }
        Ok(schedules)
    }

    /// Update a schedule's destinations/interval/retention/enabled state.
    /// `next_run_at` is only honored when this call transitions `enabled`
    /// from false to true (§4.2: re-enabling recomputes `next_run_at`,
    /// and the caller is expected to have already computed it via
    /// [`crate::pipeline::next_fire`]); the schedule's name and target
    /// cannot be changed once created.
    #[allow(clippy::too_many_arguments)]
    pub fn update_schedule(
        &self,
        id: &str,
        destination_ids: Option<&[String]>,
        interval_seconds: Option<i64>,
        retention: Option<crate::models::RetentionPolicy>,
        enabled: Option<bool>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Schedule> {
        let mut schedule = self.get_schedule(id)?;
        if let Some(interval) = interval_seconds {
            schedule.interval_seconds = interval;
        }
        if let Some(r) = retention {
            schedule.retention = r;
        }
        if let Some(enabled) = enabled {
            if enabled && !schedule.enabled {
                schedule.next_run_at = next_run_at;
            } else if !enabled {
                schedule.next_run_at = None;
            }
            schedule.enabled = enabled;
        }

        let conn = self.pool.get()?;
        let now = Utc::now();
        let stored_retention = self.encrypt_retention_password(schedule.retention.clone())?;
        conn.execute(
            "UPDATE backup_schedules SET interval_seconds = ?1, retention = ?2, enabled = ?3, next_run_at = ?4, updated_at = ?5 WHERE id = ?6",
            params![
                schedule.interval_seconds,
                serde_json::to_string(&stored_retention)?,
                schedule.enabled as i64,
                schedule.next_run_at.map(now_str),
                now_str(now),
                id
            ],
        )?;

        if let Some(dest_ids) = destination_ids {
            if dest_ids.is_empty() {
                return Err(BackupError::Validation(
                    "a schedule requires at least one destination".into(),
                ));
            }
            conn.execute("DELETE FROM backup_schedule_destinations WHERE schedule_id = ?1", params![id])?;
            for dest_id in dest_ids {
                conn.execute(
                    "INSERT INTO backup_schedule_destinations (schedule_id, destination_id) VALUES (?1, ?2)",
                    params![id, dest_id],
                )?;
            }
            schedule.destination_ids = dest_ids.to_vec();
        }

        schedule.updated_at = now;
        Ok(schedule)
    }

    /// Schedules due to run now: `enabled = true AND (next_run_at IS NULL
    /// OR next_run_at <= now)`, ordered by `next_run_at ASC NULLS FIRST`.
    pub fn due_schedules(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Schedule>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, target_id, enabled, interval_seconds, next_run_at, last_run_at,
                    retention, created_at, updated_at
             FROM backup_schedules
             WHERE enabled = 1 AND (next_run_at IS NULL OR next_run_at <= ?1)
             ORDER BY (next_run_at IS NULL) DESC, next_run_at ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![now_str(now), limit as i64], row_to_schedule)?;
        let mut schedules = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(BackupError::Database)?;
        for schedule in &mut schedules {
            schedule.destination_ids = self.schedule_destination_ids(&conn, &schedule.id)?;
            schedule.retention = self.decrypt_retention_password(schedule.retention.clone())?;
        }
        Ok(schedules)
    }

    pub fn set_schedule_enabled(&self, id: &str, enabled: bool, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let conn = self.pool.get()?;
        let now = now_str(Utc::now());
        let next = if enabled { next_run_at } else { None };
        let n = conn.execute(
            "UPDATE backup_schedules SET enabled = ?1, next_run_at = ?2, updated_at = ?3 WHERE id = ?4",
            params![enabled as i64, next.map(now_str), now, id],
        )?;
        if n == 0 {
            return Err(BackupError::NotFound(format!("schedule not found: {id}")));
        }
        Ok(())
    }

    pub fn advance_schedule(
        &self,
        id: &str,
        next_run_at: Option<DateTime<Utc>>,
        last_run_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE backup_schedules SET next_run_at = ?1, last_run_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![next_run_at.map(now_str), now_str(last_run_at), id],
        )?;
        Ok(())
    }

    pub fn delete_schedule(&self, id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let n = conn.execute("DELETE FROM backup_schedules WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(BackupError::NotFound(format!("schedule not found: {id}")));
        }
        Ok(())
    }

    // ---- runs -----------------------------------------------------------

    pub fn create_run(&self, schedule_id: Option<&str>) -> Result<Run> {
        let conn = self.pool.get()?;
        let id = new_id();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO backup_runs (id, schedule_id, status, started_at) VALUES (?1, ?2, 'started', ?3)",
            params![id, schedule_id, now_str(now)],
        )?;
        Ok(Run {
            id,
            schedule_id: schedule_id.map(|s| s.to_string()),
            status: RunStatus::Started,
            started_at: now,
            finished_at: None,
            backup_filename: None,
            details: None,
            error_message: None,
        })
    }

    pub fn finish_run(
        &self,
        id: &str,
        status: RunStatus,
        backup_filename: Option<&str>,
        details: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let status_str = match status {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        };
        conn.execute(
            "UPDATE backup_runs SET status = ?1, finished_at = ?2, backup_filename = ?3, details = ?4, error_message = ?5 WHERE id = ?6",
            params![
                status_str,
                now_str(Utc::now()),
                backup_filename,
                details.map(|d| d.to_string()),
                error_message,
                id
            ],
        )?;
        Ok(())
    }

    pub fn get_run(&self, id: &str) -> Result<Run> {
        let conn = self.pool.get()?;
        conn.query_row(
            "SELECT id, schedule_id, status, started_at, finished_at, backup_filename, details, error_message
             FROM backup_runs WHERE id = ?1",
            params![id],
            row_to_run,
        )
        .optional()?
        .ok_or_else(|| BackupError::NotFound(format!("run not found: {id}")))
    }

    pub fn list_runs(&self, limit: i64, offset: i64) -> Result<Vec<Run>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, schedule_id, status, started_at, finished_at, backup_filename, details, error_message
             FROM backup_runs ORDER BY started_at DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt.query_map(params![limit, offset], row_to_run)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(BackupError::Database)
    }

    pub fn delete_run(&self, id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let n = conn.execute("DELETE FROM backup_runs WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(BackupError::NotFound(format!("run not found: {id}")));
        }
        Ok(())
    }

    pub fn count_runs(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT COUNT(*) FROM backup_runs", [], |r| r.get(0))
            .map_err(BackupError::Database)
    }

    // ---- audit events -----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn create_audit_event(
        &self,
        operation: &str,
        trigger: Trigger,
        status: RunStatus,
        target: Option<(&str, &str)>,
        destination: Option<(&str, &str)>,
        schedule: Option<(&str, &str)>,
        run_id: Option<&str>,
        user: Option<(&str, &str)>,
    ) -> Result<AuditEvent> {
        let conn = self.pool.get()?;
        let id = new_id();
        let now = Utc::now();
        let status_str = match status {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        };
        let finished_at = if status == RunStatus::Started { None } else { Some(now_str(now)) };
        conn.execute(
            "INSERT INTO audit_events
                (id, operation, trigger, status, started_at, finished_at,
                 target_id, target_name, destination_id, destination_name,
                 schedule_id, schedule_name, backup_id, backup_name, run_id,
                 user_id, user_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, NULL, ?13, ?14, ?15)",
            params![
                id,
                operation,
                trigger.as_str(),
                status_str,
                now_str(now),
                finished_at,
                target.map(|t| t.0),
                target.map(|t| t.1),
                destination.map(|d| d.0),
                destination.map(|d| d.1),
                schedule.map(|s| s.0),
                schedule.map(|s| s.1),
                run_id,
                user.map(|u| u.0),
                user.map(|u| u.1),
            ],
        )?;
        Ok(AuditEvent {
            id,
            operation: operation.to_string(),
            trigger,
            status,
            started_at: now,
            finished_at: finished_at.map(|_| now),
            target_id: target.map(|t| t.0.to_string()),
            target_name: target.map(|t| t.1.to_string()),
            destination_id: destination.map(|d| d.0.to_string()),
            destination_name: destination.map(|d| d.1.to_string()),
            schedule_id: schedule.map(|s| s.0.to_string()),
            schedule_name: schedule.map(|s| s.1.to_string()),
            backup_id: None,
            backup_name: None,
            run_id: run_id.map(|s| s.to_string()),
            user_id: user.map(|u| u.0.to_string()),
            user_name: user.map(|u| u.1.to_string()),
            details: None,
            error_message: None,
        })
    }

    pub fn finish_audit_event(
        &self,
        id: &str,
        status: RunStatus,
        backup: Option<(&str, &str)>,
        details: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.pool.get()?;
        let status_str = match status {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        };
        conn.execute(
            "UPDATE audit_events SET status = ?1, finished_at = ?2, backup_id = ?3, backup_name = ?4, details = ?5, error_message = ?6 WHERE id = ?7",
            params![
                status_str,
                now_str(Utc::now()),
                backup.map(|b| b.0),
                backup.map(|b| b.1),
                details.map(|d| d.to_string()),
                error_message,
                id
            ],
        )?;
        Ok(())
    }

    pub fn get_audit_event(&self, id: &str) -> Result<AuditEvent> {
        let conn = self.pool.get()?;
        conn.query_row(AUDIT_SELECT_SQL_BY_ID, params![id], row_to_audit)
            .optional()?
            .ok_or_else(|| BackupError::NotFound(format!("audit event not found: {id}")))
    }

    pub fn list_audit_events(
        &self,
        target_id: Option<&str>,
        operation: Option<&str>,
        trigger: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AuditEvent>> {
        let conn = self.pool.get()?;
        let mut sql = String::from(AUDIT_SELECT_SQL_BASE);
        let mut conditions = Vec::new();
        if target_id.is_some() {
            conditions.push("target_id = ?");
        }
        if operation.is_some() {
            conditions.push("operation = ?");
        }
        match trigger {
            Some("non_scheduled") => conditions.push("trigger != 'scheduled'"),
            Some(_) => conditions.push("trigger = ?"),
            None => {}
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY started_at DESC LIMIT ? OFFSET ?");

        let mut stmt = conn.prepare(&sql)?;
        let mut binds: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(t) = target_id {
            binds.push(t);
        }
        if let Some(o) = operation {
            binds.push(o);
        }
        if let Some(t) = trigger {
            if t != "non_scheduled" {
                binds.push(t);
            }
        }
        binds.push(&limit);
        binds.push(&offset);

        let rows = stmt.query_map(binds.as_slice(), row_to_audit)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(BackupError::Database)
    }

    pub fn count_audit_events(&self, target_id: Option<&str>, operation: Option<&str>, trigger: Option<&str>) -> Result<i64> {
        let conn = self.pool.get()?;
        let mut sql = String::from("SELECT COUNT(*) FROM audit_events");
        let mut conditions = Vec::new();
        if target_id.is_some() {
            conditions.push("target_id = ?");
        }
        if operation.is_some() {
            conditions.push("operation = ?");
        }
        match trigger {
            Some("non_scheduled") => conditions.push("trigger != 'scheduled'"),
            Some(_) => conditions.push("trigger = ?"),
            None => {}
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut binds: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(t) = target_id {
            binds.push(t);
        }
        if let Some(o) = operation {
            binds.push(o);
        }
        if let Some(t) = trigger {
            if t != "non_scheduled" {
                binds.push(t);
            }
        }
        stmt.query_row(binds.as_slice(), |r| r.get(0))
            .map_err(BackupError::Database)
    }
}

const AUDIT_SELECT_SQL_BASE: &str = "SELECT id, operation, trigger, status, started_at, finished_at,
    target_id, target_name, destination_id, destination_name,
    schedule_id, schedule_name, backup_id, backup_name, run_id,
    user_id, user_name, details, error_message FROM audit_events";

const AUDIT_SELECT_SQL_BY_ID: &str = "SELECT id, operation, trigger, status, started_at, finished_at,
    target_id, target_name, destination_id, destination_name,
    schedule_id, schedule_name, backup_id, backup_name, run_id,
    user_id, user_name, details, error_message FROM audit_events WHERE id = ?1";

fn row_to_target(row: &rusqlite::Row<'_>) -> rusqlite::Result<Target> {
    let config_str: String = row.get(2)?;
    let config: TargetConfig = serde_json::from_str(&config_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let config_encrypted: Option<String> = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Target {
        id: row.get(0)?,
        name: row.get(1)?,
        db_type: config.db_type(),
        config,
        secrets_present: config_encrypted.is_some(),
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: parse_dt(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_dt(&updated_at).unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_destination(row: &rusqlite::Row<'_>) -> rusqlite::Result<Destination> {
    let config_str: String = row.get(2)?;
    let config: DestinationConfig = serde_json::from_str(&config_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e)))?;
    let config_encrypted: Option<String> = row.get(3)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Destination {
        id: row.get(0)?,
        name: row.get(1)?,
        destination_type: config.destination_type(),
        config,
        secrets_present: config_encrypted.is_some(),
        is_active: row.get::<_, i64>(4)? != 0,
        created_at: parse_dt(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_dt(&updated_at).unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let retention_str: String = row.get(7)?;
    let retention = serde_json::from_str(&retention_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e)))?;
    let next_run_at: Option<String> = row.get(5)?;
    let last_run_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(Schedule {
        id: row.get(0)?,
        name: row.get(1)?,
        target_id: row.get(2)?,
        destination_ids: Vec::new(),
        enabled: row.get::<_, i64>(3)? != 0,
        interval_seconds: row.get(4)?,
        next_run_at: next_run_at.and_then(|s| parse_dt(&s).ok()),
        last_run_at: last_run_at.and_then(|s| parse_dt(&s).ok()),
        retention,
        created_at: parse_dt(&created_at).unwrap_or_else(|_| Utc::now()),
        updated_at: parse_dt(&updated_at).unwrap_or_else(|_| Utc::now()),
    })
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<Run> {
    let status: String = row.get(2)?;
    let started_at: String = row.get(3)?;
    let finished_at: Option<String> = row.get(4)?;
    let details: Option<String> = row.get(6)?;
    Ok(Run {
        id: row.get(0)?,
        schedule_id: row.get(1)?,
        status: parse_run_status(&status),
        started_at: parse_dt(&started_at).unwrap_or_else(|_| Utc::now()),
        finished_at: finished_at.and_then(|s| parse_dt(&s).ok()),
        backup_filename: row.get(5)?,
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
        error_message: row.get(7)?,
    })
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let trigger: String = row.get(2)?;
    let status: String = row.get(3)?;
    let started_at: String = row.get(4)?;
    let finished_at: Option<String> = row.get(5)?;
    let details: Option<String> = row.get(17)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        operation: row.get(1)?,
        trigger: parse_trigger(&trigger),
        status: parse_run_status(&status),
        started_at: parse_dt(&started_at).unwrap_or_else(|_| Utc::now()),
        finished_at: finished_at.and_then(|s| parse_dt(&s).ok()),
        target_id: row.get(6)?,
        target_name: row.get(7)?,
        destination_id: row.get(8)?,
        destination_name: row.get(9)?,
        schedule_id: row.get(10)?,
        schedule_name: row.get(11)?,
        backup_id: row.get(12)?,
        backup_name: row.get(13)?,
        run_id: row.get(14)?,
        user_id: row.get(15)?,
        user_name: row.get(16)?,
        details: details.and_then(|d| serde_json::from_str(&d).ok()),
        error_message: row.get(18)?,
    })
}

fn parse_run_status(s: &str) -> RunStatus {
    match s {
        "success" => RunStatus::Success,
        "failed" => RunStatus::Failed,
        _ => RunStatus::Started,
    }
}

fn parse_trigger(s: &str) -> Trigger {
    match s {
        "manual" => Trigger::Manual,
        "system" => Trigger::System,
        _ => Trigger::Scheduled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RetentionMode, RetentionPolicy};

    fn sample_target_config() -> TargetConfig {
        TargetConfig::Postgresql {
            host: "db".into(),
            port: 5432,
            database: "app".into(),
            user: "svc".into(),
        }
    }

    #[test]
    fn create_and_fetch_target_round_trips() {
        let store = Store::in_memory().unwrap();
        let target = store.create_target("pg-main", sample_target_config(), None).unwrap();
        let fetched = store.get_target(&target.id).unwrap();
        assert_eq!(fetched.name, "pg-main");
        assert!(!fetched.secrets_present);
    }

    #[test]
    fn duplicate_target_name_conflicts() {
        let store = Store::in_memory().unwrap();
        store.create_target("pg-main", sample_target_config(), None).unwrap();
        let err = store.create_target("pg-main", sample_target_config(), None).unwrap_err();
        assert!(matches!(err, BackupError::Conflict(_)));
    }

    #[test]
    fn secrets_require_master_key() {
        let store = Store::in_memory().unwrap();
        let err = store
            .create_target("pg-main", sample_target_config(), Some(serde_json::json!({"password": "x"})))
            .unwrap_err();
        assert!(matches!(err, BackupError::EncryptionNotConfigured(_)));
    }

    #[test]
    fn local_destination_exists_and_cannot_be_deleted() {
        let store = Store::in_memory().unwrap();
        let local = store.get_destination("local").unwrap();
        assert_eq!(local.name, "local");
        let err = store.delete_destination("local").unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }

    #[test]
    fn schedule_requires_at_least_one_destination() {
        let store = Store::in_memory().unwrap();
        let target = store.create_target("pg-main", sample_target_config(), None).unwrap();
        let err = store
            .create_schedule(
                "nightly",
                &target.id,
                &[],
                86400,
                RetentionPolicy {
                    mode: RetentionMode::LastN { keep_last: 7 },
                    min_backups: None,
                    max_backups: None,
                    run_at_time: None,
                    encrypt: false,
                    encryption_password: None,
                },
                true,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, BackupError::Validation(_)));
    }

    #[test]
    fn due_schedules_returns_only_enabled_and_due() {
        let store = Store::in_memory().unwrap();
        let target = store.create_target("pg-main", sample_target_config(), None).unwrap();
        let schedule = store
            .create_schedule(
                "nightly",
                &target.id,
                &["local".to_string()],
                86400,
                RetentionPolicy {
                    mode: RetentionMode::LastN { keep_last: 7 },
                    min_backups: None,
                    max_backups: None,
                    run_at_time: None,
                    encrypt: false,
                    encryption_password: None,
                },
                true,
                Some(Utc::now() - chrono::Duration::hours(1)),
            )
            .unwrap();
        let due = store.due_schedules(Utc::now(), 10).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, schedule.id);
    }
}
