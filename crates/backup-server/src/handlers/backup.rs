//! `/automation/backup-now` and `/automation/restore-now` handlers.

use std::sync::Arc;

use axum::extract::{Json, State};
use serde::Deserialize;

use backup_core::{run_backup, run_restore, PipelineTrigger, RestoreRequest};

use crate::{AppError, AppState};

const BUILT_IN_LOCAL_DESTINATION_ID: &str = "local";

#[derive(Deserialize)]
pub struct BackupNowRequest {
    pub target_id: String,
    #[serde(default)]
    pub destination_ids: Vec<String>,
    #[serde(default)]
    pub use_local_storage: bool,
    pub encryption_password: Option<String>,
}

pub async fn backup_now(State(state): State<Arc<AppState>>, Json(req): Json<BackupNowRequest>) -> Result<Json<serde_json::Value>, AppError> {
    let destination_ids = if req.destination_ids.is_empty() && req.use_local_storage {
        vec![BUILT_IN_LOCAL_DESTINATION_ID.to_string()]
    } else {
        req.destination_ids
    };

    let trigger = PipelineTrigger::Manual {
        target_id: req.target_id,
        destination_ids,
        encryption_password: req.encryption_password,
    };
    let outcome = run_backup(&state.store, &state.lock, state.notifier.as_ref(), trigger).await?;
    Ok(Json(serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status,
        "backup_filename": outcome.backup_filename,
        "error_message": outcome.error_message,
        "details": outcome.details,
    })))
}

#[derive(Deserialize)]
pub struct RestoreNowRequest {
    pub target_id: String,
    pub destination_id: Option<String>,
    pub backup_id: String,
    pub encryption_password: Option<String>,
    pub confirmation: String,
    #[serde(default)]
    pub use_local_storage: bool,
}

pub async fn restore_now(State(state): State<Arc<AppState>>, Json(req): Json<RestoreNowRequest>) -> Result<Json<serde_json::Value>, AppError> {
    let destination_id = req
        .destination_id
        .or_else(|| req.use_local_storage.then(|| BUILT_IN_LOCAL_DESTINATION_ID.to_string()))
        .ok_or_else(|| backup_core::BackupError::Validation("restore-now requires destination_id or use_local_storage".into()))?;

    let request = RestoreRequest {
        target_id: req.target_id,
        destination_id,
        backup_id: req.backup_id,
        encryption_password: req.encryption_password,
        confirmation: req.confirmation,
    };
    let outcome = run_restore(&state.store, &state.lock, request).await?;
    Ok(Json(serde_json::json!({
        "status": outcome.status,
        "warnings": outcome.warnings,
    })))
}
