//! `/automation/audit` handlers.

use std::sync::Arc;

use axum::extract::{Json, Path, Query, State};
use serde::Deserialize;

use backup_core::AuditEvent;

use crate::handlers::{clamp_limit, clamp_offset};
use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct ListAuditQuery {
    pub target_id: Option<String>,
    pub operation: Option<String>,
    pub trigger: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_total: bool,
}

pub async fn list(State(state): State<Arc<AppState>>, Query(query): Query<ListAuditQuery>) -> Result<Json<serde_json::Value>, AppError> {
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let events: Vec<AuditEvent> = state.store.list_audit_events(
        query.target_id.as_deref(),
        query.operation.as_deref(),
        query.trigger.as_deref(),
        limit,
        offset,
    )?;
    if query.include_total {
        let total = state
            .store
            .count_audit_events(query.target_id.as_deref(), query.operation.as_deref(), query.trigger.as_deref())?;
        Ok(Json(serde_json::json!({ "events": events, "total": total })))
    } else {
        Ok(Json(serde_json::json!({ "events": events })))
    }
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<AuditEvent>, AppError> {
    Ok(Json(state.store.get_audit_event(&id)?))
}
