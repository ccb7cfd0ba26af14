//! `/automation/destinations/{id}/backups` handlers: list/download/delete.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use backup_core::{delete_destination_backup, download_destination_backup, list_destination_backups};

use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct ListBackupsQuery {
    pub target_id: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(destination_id): Path<String>,
    Query(query): Query<ListBackupsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let backups = list_destination_backups(&state.store, &destination_id, query.target_id.as_deref()).await?;
    Ok(Json(serde_json::json!({ "backups": backups })))
}

#[derive(Deserialize)]
pub struct DownloadBackupQuery {
    pub backup_id: String,
    pub filename: Option<String>,
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(destination_id): Path<String>,
    Query(query): Query<DownloadBackupQuery>,
) -> Result<impl IntoResponse, AppError> {
    let temp_dir = tempfile::tempdir().map_err(backup_core::BackupError::Io)?;
    let dest_path = temp_dir.path().join("download");
    download_destination_backup(&state.store, &destination_id, &query.backup_id, &dest_path).await?;

    let bytes = tokio::fs::read(&dest_path).await.map_err(backup_core::BackupError::Io)?;
    let filename = query.filename.unwrap_or_else(|| {
        std::path::Path::new(&query.backup_id)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or(query.backup_id.clone())
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from(bytes),
    ))
}

#[derive(Deserialize)]
pub struct DeleteBackupQuery {
    pub backup_id: String,
    pub name: Option<String>,
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(destination_id): Path<String>,
    Query(query): Query<DeleteBackupQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let name = query.name.clone().unwrap_or_else(|| query.backup_id.clone());
    delete_destination_backup(&state.store, &destination_id, &query.backup_id, &name).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
