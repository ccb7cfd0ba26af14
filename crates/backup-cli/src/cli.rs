//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Backup orchestration engine for PostgreSQL, MySQL, SQLite and Neo4j
#[derive(Parser)]
#[command(name = "backup")]
#[command(about = "Multi-database backup orchestration engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Root data directory (config store + local backup storage).
    ///
    /// Defaults to `BACKUP_DATA_DIR`, falling back to the platform data dir.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the REST API server (and, unless RUNNER_MODE=direct, the background runner)
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Manage backup targets (the databases being backed up)
    Targets {
        #[command(subcommand)]
        action: TargetsAction,
    },

    /// Manage backup destinations (where artifacts are stored)
    Destinations {
        #[command(subcommand)]
        action: DestinationsAction,
    },

    /// Manage backup schedules
    Schedules {
        #[command(subcommand)]
        action: SchedulesAction,
    },

    /// Run a one-off manual backup outside any schedule
    BackupNow {
        /// Target id to back up
        #[arg(long)]
        target_id: String,

        /// Destination ids to upload to (repeatable)
        #[arg(long = "destination")]
        destination_ids: Vec<String>,

        /// Use the built-in local storage destination instead of listing one explicitly
        #[arg(long)]
        use_local_storage: bool,

        /// Encrypt the artifact with this password (overrides retention policy default)
        #[arg(long)]
        encryption_password: Option<String>,
    },

    /// Restore a target database from a stored backup
    RestoreNow {
        /// Target id to restore into
        #[arg(long)]
        target_id: String,

        /// Destination id the backup lives on
        #[arg(long)]
        destination_id: Option<String>,

        /// Use the built-in local storage destination
        #[arg(long)]
        use_local_storage: bool,

        /// Stored backup id
        #[arg(long)]
        backup_id: String,

        /// Decryption password, if the artifact is encrypted
        #[arg(long)]
        encryption_password: Option<String>,

        /// Must be exactly "RESTORE" - a deliberate speed bump against accidental restores
        #[arg(long)]
        confirm: String,
    },

    /// Inspect run history
    Runs {
        #[command(subcommand)]
        action: RunsAction,
    },

    /// Inspect the audit log
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },

    /// Run whichever schedules are currently due, bounded by RUNNER_MAX_SCHEDULES
    RunDue,
}

#[derive(Subcommand)]
pub enum TargetsAction {
    /// Register a new target from a JSON config file (or stdin with `-`)
    Add {
        /// Target name
        name: String,
        /// Path to a JSON file with `{"config": {...}, "secrets": {...}}`, or "-" for stdin
        #[arg(long)]
        file: PathBuf,
    },
    /// List all targets
    List,
    /// Show one target
    Get { id: String },
    /// Update a target's active flag (config/secret changes go through `add`'s file shape)
    SetActive { id: String, active: bool },
    /// Delete a target
    Delete { id: String },
    /// Test the adapter connection for a target
    TestConnection { id: String },
}

#[derive(Subcommand)]
pub enum DestinationsAction {
    /// Register a new destination from a JSON config file (or stdin with `-`)
    Add {
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
    List,
    Get { id: String },
    SetActive { id: String, active: bool },
    Delete { id: String },
    /// List the stored backups on a destination
    Backups {
        id: String,
        #[arg(long)]
        target_id: Option<String>,
    },
    /// Download a stored backup to a local path
    Download {
        id: String,
        #[arg(long)]
        backup_id: String,
        #[arg(long)]
        out: PathBuf,
    },
    /// Delete a stored backup from a destination
    DeleteBackup {
        id: String,
        #[arg(long)]
        backup_id: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
pub enum SchedulesAction {
    /// Create a schedule from a JSON config file (or stdin with `-`)
    Add {
        name: String,
        #[arg(long)]
        file: PathBuf,
    },
    List,
    Get { id: String },
    Delete { id: String },
    Enable { id: String },
    Disable { id: String },
    /// Run a single schedule immediately, outside its normal cadence
    RunNow { id: String },
    /// Run every enabled schedule immediately, regardless of next_run_at
    RunEnabledNow,
}

#[derive(Subcommand)]
pub enum RunsAction {
    List {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    Get { id: String },
    Delete { id: String },
}

#[derive(Subcommand)]
pub enum AuditAction {
    List {
        #[arg(long)]
        target_id: Option<String>,
        #[arg(long)]
        operation: Option<String>,
        #[arg(long)]
        trigger: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    Get { id: String },
}
