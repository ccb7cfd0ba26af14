//! Backup Core Library
//!
//! Shared functionality for the multi-database backup orchestration
//! engine:
//! - Configuration store (targets/destinations/schedules/runs/audit)
//! - Execution pipeline (produce, encrypt, upload, retention sweep)
//! - Restore pipeline (download, decrypt, compatibility-check, apply)
//! - Retention planning
//! - Storage-provider abstraction (local, SFTP, Google Drive)
//! - Database adapters (PostgreSQL, MySQL, SQLite, Neo4j)
//! - Process-local operation lock
//! - Notifications (SMTP, Telegram)

pub mod adapters;
pub mod config;
pub mod crypto;
pub mod error;
pub mod lock;
pub mod models;
pub mod naming;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod restore;
pub mod retention;
pub mod secrets;
pub mod store;

pub use adapters::{build_adapter, DatabaseAdapter, DatabaseStats};
pub use config::{EngineConfig, LogConfig, RunnerConfig, RunnerMode};
pub use error::{BackupError, CompatibilityWarning, Result};
pub use lock::{LockGuard, LockStatus, OperationLock};
pub use models::{
    AuditEvent, DbType, Destination, DestinationConfig, DestinationType, LockOperation,
    RetentionMode, RetentionPolicy, Run, RunStatus, Schedule, SmartProfile, StoredBackup, Target,
    TargetConfig, Trigger,
};
pub use notify::{CompositeNotifier, NoopNotifier, Notifier, NotificationEvent, NotifyOutcome, Severity};
pub use pipeline::{
    delete_destination_backup, download_destination_backup, list_destination_backups, next_fire,
    run_backup, PipelineOutcome, PipelineTrigger,
};
pub use providers::{GoogleDriveProvider, LocalProvider, SftpAuth, SftpProvider, StorageProvider};
pub use restore::{run_restore, RestoreOutcome, RestoreRequest};
pub use retention::plan_retention;
pub use secrets::SecretCipher;
pub use store::Store;
