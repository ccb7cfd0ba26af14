//! One-off manual backup-now / restore-now commands.

use std::path::Path;

use anyhow::{bail, Result};
use backup_core::{run_backup, run_restore, NoopNotifier, OperationLock, PipelineTrigger, RestoreRequest};

use super::{open_store, print_json};

const BUILT_IN_LOCAL_DESTINATION_ID: &str = "local";

#[allow(clippy::too_many_arguments)]
pub async fn cmd_backup_now(
    data_dir: &Path,
    target_id: &str,
    destination_ids: Vec<String>,
    use_local_storage: bool,
    encryption_password: Option<String>,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let lock = OperationLock::new(data_dir.join("backup.lock"));

    let destination_ids = if destination_ids.is_empty() && use_local_storage {
        vec![BUILT_IN_LOCAL_DESTINATION_ID.to_string()]
    } else {
        destination_ids
    };

    let trigger = PipelineTrigger::Manual {
        target_id: target_id.to_string(),
        destination_ids,
        encryption_password,
    };
    let outcome = run_backup(&store, &lock, &NoopNotifier, trigger).await?;
    print_json(&serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status,
        "backup_filename": outcome.backup_filename,
        "error_message": outcome.error_message,
    }))
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_restore_now(
    data_dir: &Path,
    target_id: &str,
    destination_id: Option<String>,
    use_local_storage: bool,
    backup_id: &str,
    encryption_password: Option<String>,
    confirmation: &str,
) -> Result<()> {
    let store = open_store(data_dir)?;
    let lock = OperationLock::new(data_dir.join("backup.lock"));

    let destination_id = match destination_id.or_else(|| use_local_storage.then(|| BUILT_IN_LOCAL_DESTINATION_ID.to_string())) {
        Some(id) => id,
        None => bail!("restore-now requires --destination-id or --use-local-storage"),
    };

    let request = RestoreRequest {
        target_id: target_id.to_string(),
        destination_id,
        backup_id: backup_id.to_string(),
        encryption_password,
        confirmation: confirmation.to_string(),
    };
    let outcome = run_restore(&store, &lock, request).await?;
    print_json(&serde_json::json!({ "status": outcome.status, "warnings": outcome.warnings }))
}
