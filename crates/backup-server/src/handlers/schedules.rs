//! `/automation/schedules` handlers and the manual/drain run-now surface.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use chrono::Utc;
use serde::Deserialize;

use backup_core::{next_fire, run_backup, PipelineTrigger, RetentionPolicy, Schedule};

use crate::{AppError, AppState};

#[derive(Deserialize)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub target_id: String,
    pub destination_ids: Vec<String>,
    pub interval_seconds: i64,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create(State(state): State<Arc<AppState>>, Json(req): Json<CreateScheduleRequest>) -> Result<Json<Schedule>, AppError> {
    let next_run_at = if req.enabled {
        Some(next_fire(req.interval_seconds, req.retention.run_at_time.as_deref(), Utc::now()))
    } else {
        None
    };
    let schedule = state.store.create_schedule(
        &req.name,
        &req.target_id,
        &req.destination_ids,
        req.interval_seconds,
        req.retention,
        req.enabled,
        next_run_at,
    )?;
    Ok(Json(schedule))
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Schedule>>, AppError> {
    Ok(Json(state.store.list_schedules()?))
}

pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Schedule>, AppError> {
    Ok(Json(state.store.get_schedule(&id)?))
}

#[derive(Deserialize)]
pub struct UpdateScheduleRequest {
    pub destination_ids: Option<Vec<String>>,
    pub interval_seconds: Option<i64>,
    pub retention: Option<RetentionPolicy>,
    pub enabled: Option<bool>,
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<Schedule>, AppError> {
    let next_run_at = if req.enabled == Some(true) {
        let existing = state.store.get_schedule(&id)?;
        let interval = req.interval_seconds.unwrap_or(existing.interval_seconds);
        let run_at_time = req
            .retention
            .as_ref()
            .and_then(|r| r.run_at_time.clone())
            .or(existing.retention.run_at_time);
        Some(next_fire(interval, run_at_time.as_deref(), Utc::now()))
    } else {
        None
    };
    let schedule = state.store.update_schedule(
        &id,
        req.destination_ids.as_deref(),
        req.interval_seconds,
        req.retention,
        req.enabled,
        next_run_at,
    )?;
    Ok(Json(schedule))
}

pub async fn delete(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.delete_schedule(&id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// Manually trigger a single schedule. Uses the same execution pipeline as
/// the runner tick; unlike a tick-driven run, the schedule's `next_run_at`
/// is still advanced by the pipeline's finalizer (the pipeline does not
/// distinguish manual vs. tick-driven scheduled runs).
pub async fn run_now(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, AppError> {
    let schedule = state.store.get_schedule(&id)?;
    let outcome = run_backup(&state.store, &state.lock, state.notifier.as_ref(), PipelineTrigger::Scheduled(schedule)).await?;
    Ok(Json(serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status,
        "backup_filename": outcome.backup_filename,
        "details": outcome.details,
    })))
}

/// Run every enabled schedule once, regardless of `next_run_at`.
pub async fn run_enabled_now(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let schedules: Vec<Schedule> = state.store.list_schedules()?.into_iter().filter(|s| s.enabled).collect();
    let mut results = Vec::new();
    for schedule in schedules {
        let id = schedule.id.clone();
        let result = run_backup(&state.store, &state.lock, state.notifier.as_ref(), PipelineTrigger::Scheduled(schedule)).await;
        results.push(match result {
            Ok(outcome) => serde_json::json!({
                "schedule_id": id,
                "run_id": outcome.run_id,
                "status": outcome.status,
            }),
            Err(e) => serde_json::json!({ "schedule_id": id, "status": "failed", "error": e.to_string() }),
        });
    }
    Ok(Json(serde_json::json!({ "count": results.len(), "results": results })))
}

/// Run whatever is currently due, bounded by `RUNNER_MAX_SCHEDULES` — the
/// same selection the background runner tick uses, exposed for
/// `RUNNER_MODE=api` deployments that drive the runner externally.
pub async fn run_due(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, AppError> {
    let config = backup_core::RunnerConfig::from_env();
    let now = Utc::now();
    let due = state.store.due_schedules(now, config.max_schedules)?;
    let mut results = Vec::new();
    for schedule in due {
        let id = schedule.id.clone();
        let result = run_backup(&state.store, &state.lock, state.notifier.as_ref(), PipelineTrigger::Scheduled(schedule)).await;
        results.push(match result {
            Ok(outcome) => serde_json::json!({
                "schedule_id": id,
                "run_id": outcome.run_id,
                "status": outcome.status,
            }),
            Err(e) => serde_json::json!({ "schedule_id": id, "status": "failed", "error": e.to_string() }),
        });
    }
    Ok(Json(serde_json::json!({ "now": now, "count": results.len(), "results": results })))
}
