//! `/automation/targets` handlers.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use serde::Deserialize;

use backup_core::{build_adapter, Target, TargetConfig};

use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    pub config: TargetConfig,
    pub secrets: Option<serde_json::Value>,
}

pub async fn create(State(state): State<Arc<AppState>>, Json(req): Json<CreateTargetRequest>) -> Result<Json<Target>, AppError> {
    let target = state.store.create_target(&req.name, req.config, req.secrets)?;
    Ok(Json(target))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Target>>, AppError> {
    Ok(Json(state.store.list_targets()?))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Target>, AppError> {
    Ok(Json(state.store.get_target(&id)?))
}

#[derive(Deserialize)]
pub struct UpdateTargetRequest {
    pub config: Option<TargetConfig>,
    pub secrets: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTargetRequest>,
) -> Result<Json<Target>, AppError> {
    let target = state.store.update_target(&id, req.config, req.secrets, req.is_active)?;
    Ok(Json(target))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_target(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct TestConnectionRequest {
    pub target_id: String,
}

/// Resolves the named target's secrets and runs the database adapter's
/// `test_connection` (must complete within the adapter's 10s budget).
pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TestConnectionRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let target = state.store.get_target(&req.target_id)?;
    let secrets = state.store.resolve_target_secrets(&target.id)?;
    let adapter = build_adapter(&target, secrets)?;
    adapter.test_connection().await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
