//! `/automation/destinations` handlers.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use serde::Deserialize;

use backup_core::{Destination, DestinationConfig};

use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct CreateDestinationRequest {
    pub name: String,
    pub config: DestinationConfig,
    pub secrets: Option<serde_json::Value>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateDestinationRequest>,
) -> Result<Json<Destination>, AppError> {
    Ok(Json(state.store.create_destination(&req.name, req.config, req.secrets)?))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Destination>>, AppError> {
    Ok(Json(state.store.list_destinations()?))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Destination>, AppError> {
    Ok(Json(state.store.get_destination(&id)?))
}

#[derive(Deserialize)]
pub struct UpdateDestinationRequest {
    pub config: Option<DestinationConfig>,
    pub secrets: Option<serde_json::Value>,
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateDestinationRequest>,
) -> Result<Json<Destination>, AppError> {
    Ok(Json(state.store.update_destination(&id, req.config, req.secrets, req.is_active)?))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_destination(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}
