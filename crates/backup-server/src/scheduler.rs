//! Background runner that drives due schedules.
//!
//! Enabled when `RunnerConfig::mode` is `RunnerMode::Api` (the server ticks
//! schedules itself); in `RunnerMode::Direct` an external process is expected
//! to call `POST /automation/runner/run-due` instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

pub use backup_core::RunnerConfig;
use backup_core::{run_backup, OperationLock, PipelineTrigger, Store};

pub fn start_runner(store: Arc<Store>, lock: Arc<OperationLock>, notifier: Arc<dyn backup_core::Notifier>, config: RunnerConfig) {
    info!(
        interval_seconds = config.interval_seconds,
        max_schedules = config.max_schedules,
        drain_mode = config.drain_mode,
        "starting schedule runner"
    );

    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(config.interval_seconds));
        loop {
            ticker.tick().await;
            run_due_once(&store, &lock, notifier.as_ref(), &config).await;
        }
    });
}

/// Runs all currently-due schedules, batching in `drain_mode` so a long
/// outage doesn't strand schedules behind `max_schedules` forever.
pub async fn run_due_once(store: &Store, lock: &OperationLock, notifier: &dyn backup_core::Notifier, config: &RunnerConfig) -> usize {
    let mut total_run = 0;
    let mut batches = 0;

    loop {
        let due = match store.due_schedules(chrono::Utc::now(), config.max_schedules) {
            Ok(due) => due,
            Err(err) => {
                error!(error = %err, "failed to query due schedules");
                break;
            }
        };
        if due.is_empty() {
            break;
        }

        for schedule in due {
            let schedule_id = schedule.id.clone();
            match run_backup(store, lock, notifier, PipelineTrigger::Scheduled(schedule)).await {
                Ok(outcome) => info!(schedule_id, run_id = %outcome.run_id, status = ?outcome.status, "scheduled backup finished"),
                Err(err) => warn!(schedule_id, error = %err, "scheduled backup failed"),
            }
            total_run += 1;
        }

        batches += 1;
        if !config.drain_mode || batches >= config.drain_max_batches {
            break;
        }
    }

    total_run
}
