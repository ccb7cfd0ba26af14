//! `/automation/runs` handlers.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use serde::Deserialize;

use backup_core::Run;

use crate::handlers::{clamp_limit, clamp_offset};
use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_total: bool,
}

pub async fn list(State(state): State<Arc<AppState>>, Query(query): Query<ListRunsQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let runs: Vec<Run> = state.store.list_runs(limit, offset)?;
    if query.include_total {
        let total = state.store.count_runs()?;
        Ok(Json(serde_json::json!({ "runs": runs, "total": total })))
    } else {
        Ok(Json(serde_json::json!({ "runs": runs })))
    }
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Run>, AppError> {
    Ok(Json(state.store.get_run(&id)?))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_run(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}
