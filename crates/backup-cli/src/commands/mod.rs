//! CLI command implementations
//!
//! Commands are organized by resource family, mirroring the REST handlers:
//! - `targets` - target CRUD + test-connection
//! - `destinations` - destination CRUD + stored-backup list/download/delete
//! - `schedules` - schedule CRUD + run-now/run-enabled-now/run-due
//! - `backup` - one-off manual backup-now/restore-now
//! - `runs` - run history
//! - `audit` - audit log
//! - `serve` - start the REST server (and background runner)

pub mod audit;
pub mod backup;
pub mod destinations;
pub mod runs;
pub mod schedules;
pub mod serve;
pub mod targets;

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backup_core::{EngineConfig, Store};

/// Resolve the data directory: `--data-dir` flag, else `EngineConfig::from_env`.
pub fn resolve_data_dir(data_dir: Option<PathBuf>) -> PathBuf {
    match data_dir {
        Some(dir) => dir,
        None => EngineConfig::from_env().data_dir,
    }
}

/// Open the config store at `<data_dir>/store.sqlite3`, using
/// `MASTER_ENCRYPTION_KEY` (or `_FILE`) for secret-at-rest encryption if set.
pub fn open_store(data_dir: &Path) -> Result<Store> {
    let config = EngineConfig::from_env();
    let store_path = data_dir.join("store.sqlite3");
    let backups_dir = data_dir.join("backups");
    Store::open(&store_path, config.master_encryption_key.as_deref(), &backups_dir).context("failed to open config store")
}

/// Read a JSON document from a file path, or from stdin when the path is "-".
pub fn read_json_file(path: &Path) -> Result<serde_json::Value> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| "input is not valid JSON".to_string())
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
