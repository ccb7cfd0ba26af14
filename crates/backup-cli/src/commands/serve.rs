//! Server command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use backup_core::{build_notifier_from_env, EngineConfig, OperationLock};
use backup_server::{AppState, ServerConfig};

pub async fn cmd_serve(data_dir: &Path, host: &str, port: u16) -> Result<()> {
    let config = EngineConfig::from_env();
    let store_path = data_dir.join("store.sqlite3");
    let backups_dir = data_dir.join("backups");
    let store = Arc::new(backup_core::Store::open(&store_path, config.master_encryption_key.as_deref(), &backups_dir)?);
    let lock = Arc::new(OperationLock::new(data_dir.join("backup.lock")));
    let notifier: Arc<dyn backup_core::Notifier> = Arc::from(build_notifier_from_env());

    println!("starting backup-automation server");
    println!("  data dir:  {}", data_dir.display());
    println!("  listening: http://{host}:{port}");
    if config.auth_token.is_none() {
        println!("  WARNING: BACKUP_AUTH_TOKEN not set, authentication disabled");
    }

    let state = Arc::new(AppState {
        store,
        lock,
        notifier,
        config: ServerConfig {
            auth_token: config.auth_token.clone(),
            allowed_origins: vec![],
        },
    });

    backup_server::serve(state, host, port, Some(config.runner)).await
}
