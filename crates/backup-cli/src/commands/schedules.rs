//! Schedule commands: create, inspect, enable/disable, and manual triggers.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backup_core::{next_fire, run_backup, NoopNotifier, OperationLock, PipelineTrigger, RetentionPolicy, Schedule};
use chrono::Utc;

use super::{open_store, print_json, read_json_file};

#[derive(serde::Deserialize)]
struct ScheduleDoc {
    target_id: String,
    destination_ids: Vec<String>,
    interval_seconds: i64,
    #[serde(default)]
    retention: RetentionPolicy,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

pub fn cmd_schedules_add(data_dir: &Path, name: &str, file: &PathBuf) -> Result<()> {
    let store = open_store(data_dir)?;
    let doc: ScheduleDoc = serde_json::from_value(read_json_file(file)?).context("invalid schedule document")?;

    let next_run_at = doc.enabled.then(|| next_fire(doc.interval_seconds, doc.retention.run_at_time.as_deref(), Utc::now()));
    let schedule = store.create_schedule(name, &doc.target_id, &doc.destination_ids, doc.interval_seconds, doc.retention, doc.enabled, next_run_at)?;
    print_json(&schedule)
}

pub fn cmd_schedules_list(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.list_schedules()?)
}

pub fn cmd_schedules_get(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.get_schedule(id)?)
}

pub fn cmd_schedules_delete(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    store.delete_schedule(id)?;
    println!("deleted schedule {id}");
    Ok(())
}

pub fn cmd_schedules_enable(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    let schedule = store.get_schedule(id)?;
    let next_run_at = next_fire(schedule.interval_seconds, schedule.retention.run_at_time.as_deref(), Utc::now());
    store.set_schedule_enabled(id, true, Some(next_run_at))?;
    println!("enabled schedule {id}, next run at {next_run_at}");
    Ok(())
}

pub fn cmd_schedules_disable(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    store.set_schedule_enabled(id, false, None)?;
    println!("disabled schedule {id}");
    Ok(())
}

pub async fn cmd_schedules_run_now(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    let lock = OperationLock::new(data_dir.join("backup.lock"));
    let schedule = store.get_schedule(id)?;
    let outcome = run_backup(&store, &lock, &NoopNotifier, PipelineTrigger::Scheduled(schedule)).await?;
    print_json(&serde_json::json!({
        "run_id": outcome.run_id,
        "status": outcome.status,
        "backup_filename": outcome.backup_filename,
    }))
}

pub async fn cmd_schedules_run_enabled_now(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let lock = OperationLock::new(data_dir.join("backup.lock"));
    let schedules: Vec<Schedule> = store.list_schedules()?.into_iter().filter(|s| s.enabled).collect();
    let mut results = Vec::new();
    for schedule in schedules {
        let id = schedule.id.clone();
        match run_backup(&store, &lock, &NoopNotifier, PipelineTrigger::Scheduled(schedule)).await {
            Ok(outcome) => results.push(serde_json::json!({ "schedule_id": id, "run_id": outcome.run_id, "status": outcome.status })),
            Err(e) => results.push(serde_json::json!({ "schedule_id": id, "status": "failed", "error": e.to_string() })),
        }
    }
    print_json(&serde_json::json!({ "count": results.len(), "results": results }))
}

pub async fn cmd_run_due(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    let lock = OperationLock::new(data_dir.join("backup.lock"));
    let config = backup_core::RunnerConfig::from_env();
    let due = store.due_schedules(Utc::now(), config.max_schedules)?;
    let mut results = Vec::new();
    for schedule in due {
        let id = schedule.id.clone();
        match run_backup(&store, &lock, &NoopNotifier, PipelineTrigger::Scheduled(schedule)).await {
            Ok(outcome) => results.push(serde_json::json!({ "schedule_id": id, "run_id": outcome.run_id, "status": outcome.status })),
            Err(e) => results.push(serde_json::json!({ "schedule_id": id, "status": "failed", "error": e.to_string() })),
        }
    }
    print_json(&serde_json::json!({ "count": results.len(), "results": results }))
}
