//! Domain types shared by the configuration store, pipeline, and REST layer.
//!
//! `Target.config`, `Destination.config`, and `Schedule.retention` were
//! historically free-form JSON; here they are closed, tagged unions so a
//! malformed shape is rejected at the boundary instead of surfacing as a
//! missing-field error three layers down.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Supported source database families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbType {
    Postgresql,
    Mysql,
    Sqlite,
    Neo4j,
}

impl DbType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbType::Postgresql => "postgresql",
            DbType::Mysql => "mysql",
            DbType::Sqlite => "sqlite",
            DbType::Neo4j => "neo4j",
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported artifact storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    Local,
    Sftp,
    GoogleDrive,
}

impl DestinationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationType::Local => "local",
            DestinationType::Sftp => "sftp",
            DestinationType::GoogleDrive => "google_drive",
        }
    }
}

/// Connection shape for a backup source, keyed by [`DbType`].
///
/// Historically `config` carried duplicate-meaning keys (`db_user` vs
/// `user`, `db_host` vs `host`, `neo4j_url` vs `host`); the `Deserialize`
/// impl below accepts both and always normalizes to this shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "db_type", rename_all = "snake_case")]
pub enum TargetConfig {
    Postgresql {
        host: String,
        port: u16,
        database: String,
        user: String,
    },
    Mysql {
        host: String,
        port: u16,
        database: String,
        user: String,
    },
    Sqlite {
        file_path: String,
    },
    Neo4j {
        bolt_url: String,
        database: String,
    },
}

impl TargetConfig {
    pub fn db_type(&self) -> DbType {
        match self {
            TargetConfig::Postgresql { .. } => DbType::Postgresql,
            TargetConfig::Mysql { .. } => DbType::Mysql,
            TargetConfig::Sqlite { .. } => DbType::Sqlite,
            TargetConfig::Neo4j { .. } => DbType::Neo4j,
        }
    }
}

fn legacy_str(obj: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl<'de> Deserialize<'de> for TargetConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| D::Error::custom("target config must be an object"))?;
        let db_type = obj
            .get("db_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| D::Error::custom("target config missing db_type"))?;

        match db_type {
            "postgresql" | "mysql" => {
                let host = legacy_str(obj, &["host", "db_host"])
                    .ok_or_else(|| D::Error::custom("missing host"))?;
                let port = obj
                    .get("port")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| D::Error::custom("missing port"))? as u16;
                let database = legacy_str(obj, &["database", "db_name"])
                    .ok_or_else(|| D::Error::custom("missing database"))?;
                let user = legacy_str(obj, &["user", "db_user"])
                    .ok_or_else(|| D::Error::custom("missing user"))?;
                if db_type == "postgresql" {
                    Ok(TargetConfig::Postgresql {
                        host,
                        port,
                        database,
                        user,
                    })
                } else {
                    Ok(TargetConfig::Mysql {
                        host,
                        port,
                        database,
                        user,
                    })
                }
            }
            "sqlite" => {
                let file_path = legacy_str(obj, &["file_path", "path"])
                    .ok_or_else(|| D::Error::custom("missing file_path"))?;
                Ok(TargetConfig::Sqlite { file_path })
            }
            "neo4j" => {
                let bolt_url = legacy_str(obj, &["bolt_url", "neo4j_url", "host"])
                    .ok_or_else(|| D::Error::custom("missing bolt_url"))?;
                let database = obj
                    .get("database")
                    .and_then(|v| v.as_str())
                    .unwrap_or("neo4j")
                    .to_string();
                Ok(TargetConfig::Neo4j { bolt_url, database })
            }
            other => Err(D::Error::custom(format!("unknown db_type: {other}"))),
        }
    }
}

/// Storage location shape for a destination, keyed by [`DestinationType`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "destination_type", rename_all = "snake_case")]
pub enum DestinationConfig {
    Local {
        path: String,
    },
    Sftp {
        host: String,
        port: u16,
        username: String,
        base_path: String,
    },
    GoogleDrive {
        folder_id: String,
    },
}

impl DestinationConfig {
    pub fn destination_type(&self) -> DestinationType {
        match self {
            DestinationConfig::Local { .. } => DestinationType::Local,
            DestinationConfig::Sftp { .. } => DestinationType::Sftp,
            DestinationConfig::GoogleDrive { .. } => DestinationType::GoogleDrive,
        }
    }
}

impl<'de> Deserialize<'de> for DestinationConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        let value = serde_json::Value::deserialize(deserializer)?;
        let obj = value
            .as_object()
            .ok_or_else(|| D::Error::custom("destination config must be an object"))?;
        let destination_type = obj
            .get("destination_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| D::Error::custom("destination config missing destination_type"))?;

        match destination_type {
            "local" => {
                let path = legacy_str(obj, &["path", "base_path"])
                    .ok_or_else(|| D::Error::custom("missing path"))?;
                Ok(DestinationConfig::Local { path })
            }
            "sftp" => {
                let host =
                    legacy_str(obj, &["host"]).ok_or_else(|| D::Error::custom("missing host"))?;
                let port = obj.get("port").and_then(|v| v.as_u64()).unwrap_or(22) as u16;
                let username = legacy_str(obj, &["username", "user"])
                    .ok_or_else(|| D::Error::custom("missing username"))?;
                let base_path = legacy_str(obj, &["base_path", "path"])
                    .ok_or_else(|| D::Error::custom("missing base_path"))?;
                Ok(DestinationConfig::Sftp {
                    host,
                    port,
                    username,
                    base_path,
                })
            }
            "google_drive" => {
                let folder_id = legacy_str(obj, &["folder_id"])
                    .ok_or_else(|| D::Error::custom("missing folder_id"))?;
                Ok(DestinationConfig::GoogleDrive { folder_id })
            }
            other => Err(D::Error::custom(format!(
                "unknown destination_type: {other}"
            ))),
        }
    }
}

/// Smart-mode tier profile; supplies defaults for any unset tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartProfile {
    Info,
    Medium,
    High,
}

impl SmartProfile {
    /// `(daily, weekly, monthly, yearly)` defaults for this profile.
    pub fn defaults(&self) -> (usize, usize, usize, usize) {
        match self {
            SmartProfile::Info => (1, 1, 3, 1),
            SmartProfile::Medium => (7, 4, 12, 3),
            SmartProfile::High => (14, 8, 24, 5),
        }
    }
}

fn default_keep_last() -> usize {
    1
}

/// Retention mode, keyed by `mode`. See `retention::plan_retention`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetentionMode {
    LastN {
        keep_last: usize,
    },
    MaxAgeDays {
        max_age_days: i64,
        #[serde(default = "default_keep_last")]
        keep_last: usize,
    },
    MaxSize {
        max_size_bytes: u64,
        #[serde(default = "default_keep_last")]
        keep_last: usize,
    },
    Smart {
        #[serde(default)]
        profile: Option<SmartProfile>,
        #[serde(default)]
        daily: Option<usize>,
        #[serde(default)]
        weekly: Option<usize>,
        #[serde(default)]
        monthly: Option<usize>,
        #[serde(default)]
        yearly: Option<usize>,
        #[serde(default = "default_keep_last")]
        keep_last: usize,
    },
}

/// A schedule's full retention policy: the mode plus clamp bounds and the
/// shared encryption/anchor-time fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(flatten)]
    pub mode: RetentionMode,
    #[serde(default)]
    pub min_backups: Option<usize>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub run_at_time: Option<String>,
    #[serde(default)]
    pub encrypt: bool,
    /// Present only when `encrypt = true`; encrypted at rest alongside
    /// other secrets, never persisted in plaintext.
    #[serde(default)]
    pub encryption_password: Option<String>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            mode: RetentionMode::Smart {
                profile: Some(SmartProfile::Medium),
                daily: None,
                weekly: None,
                monthly: None,
                yearly: None,
                keep_last: 1,
            },
            min_backups: None,
            max_backups: None,
            run_at_time: None,
            encrypt: false,
            encryption_password: None,
        }
    }
}

/// A configured backup source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    pub db_type: DbType,
    pub config: TargetConfig,
    pub secrets_present: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A configured storage destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub destination_type: DestinationType,
    pub config: DestinationConfig,
    pub secrets_present: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A target + destinations + interval + retention plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub target_id: String,
    pub destination_ids: Vec<String>,
    pub enabled: bool,
    pub interval_seconds: i64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub retention: RetentionPolicy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Execution status shared by runs and audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    Success,
    Failed,
}

/// What initiated an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
    System,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Scheduled => "scheduled",
            Trigger::System => "system",
        }
    }
}

/// An execution record for a backup or restore attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub schedule_id: Option<String>,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub backup_filename: Option<String>,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// Append-only operational history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub operation: String,
    pub trigger: Trigger,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
    pub destination_id: Option<String>,
    pub destination_name: Option<String>,
    pub schedule_id: Option<String>,
    pub schedule_name: Option<String>,
    pub backup_id: Option<String>,
    pub backup_name: Option<String>,
    pub run_id: Option<String>,
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub details: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// A backup artifact as enumerated from a storage provider. Not persisted
/// in the config store; always derived on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredBackup {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub size: Option<u64>,
}

/// Which process-wide lock slot an operation acquires (§4.7 groups by
/// database family; this implementation uses a single slot per process,
/// matching the "one engine process" scope stated on the lock itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockOperation {
    Backup,
    Restore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_config_accepts_legacy_keys() {
        let json = serde_json::json!({
            "db_type": "postgresql",
            "db_host": "db.internal",
            "port": 5432,
            "db_name": "app",
            "db_user": "svc"
        });
        let cfg: TargetConfig = serde_json::from_value(json).unwrap();
        assert_eq!(
            cfg,
            TargetConfig::Postgresql {
                host: "db.internal".into(),
                port: 5432,
                database: "app".into(),
                user: "svc".into(),
            }
        );
    }

    #[test]
    fn target_config_neo4j_accepts_legacy_url_key() {
        let json = serde_json::json!({
            "db_type": "neo4j",
            "neo4j_url": "bolt://graph:7687"
        });
        let cfg: TargetConfig = serde_json::from_value(json).unwrap();
        assert_eq!(
            cfg,
            TargetConfig::Neo4j {
                bolt_url: "bolt://graph:7687".into(),
                database: "neo4j".into(),
            }
        );
    }

    #[test]
    fn destination_config_sftp_round_trips() {
        let json = serde_json::json!({
            "destination_type": "sftp",
            "host": "backup.example.com",
            "port": 22,
            "username": "ops",
            "base_path": "/srv/backups"
        });
        let cfg: DestinationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.destination_type(), DestinationType::Sftp);
    }

    #[test]
    fn smart_profile_defaults_match_table() {
        assert_eq!(SmartProfile::Info.defaults(), (1, 1, 3, 1));
        assert_eq!(SmartProfile::Medium.defaults(), (7, 4, 12, 3));
        assert_eq!(SmartProfile::High.defaults(), (14, 8, 24, 5));
    }
}
