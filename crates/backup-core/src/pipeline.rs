//! Execution pipeline (C3) and next-fire computation (§4.2, part of C2).

use chrono::{DateTime, NaiveTime, Utc};

use crate::adapters::build_adapter;
use crate::crypto;
use crate::error::{BackupError, Result};
use crate::lock::{LockGuard, OperationLock};
use crate::models::{Destination, DestinationConfig, LockOperation, RunStatus, Schedule, Target, Trigger};
use crate::naming;
use crate::notify::{NotificationEvent, Notifier};
use crate::providers::{GoogleDriveProvider, LocalProvider, SftpAuth, SftpProvider, StorageProvider};
use crate::retention;
use crate::store::Store;

const DEFAULT_DAILY_RUN_AT: &str = "03:30";

/// Pure next-fire computation, UTC throughout (§4.2).
///
/// Daily schedules and hourly-plus schedules with an explicit
/// `run_at_time` both walk forward from today's anchor by
/// `interval_seconds` until strictly past `reference`; everything else
/// drifts by `reference + interval_seconds`.
pub fn next_fire(interval_seconds: i64, run_at_time: Option<&str>, reference: DateTime<Utc>) -> DateTime<Utc> {
    let anchored = interval_seconds == 86_400 || (interval_seconds >= 3600 && run_at_time.is_some());
    if anchored {
        let anchor = parse_hhmm(run_at_time.unwrap_or(DEFAULT_DAILY_RUN_AT));
        let mut candidate = reference.date_naive().and_time(anchor).and_utc();
        while candidate <= reference {
            candidate += chrono::Duration::seconds(interval_seconds);
        }
        return candidate;
    }
    reference + chrono::Duration::seconds(interval_seconds)
}

fn parse_hhmm(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, "%H:%M").unwrap_or_else(|_| NaiveTime::from_hms_opt(3, 30, 0).unwrap())
}

/// What set off this pipeline run.
pub enum PipelineTrigger {
    Scheduled(Schedule),
    Manual {
        target_id: String,
        destination_ids: Vec<String>,
        encryption_password: Option<String>,
    },
}

pub struct PipelineOutcome {
    pub run_id: String,
    pub status: RunStatus,
    pub backup_filename: Option<String>,
    pub error_message: Option<String>,
    pub details: serde_json::Value,
}

pub(crate) fn build_provider(destination: &Destination, secrets: Option<serde_json::Value>) -> Result<Box<dyn StorageProvider>> {
    match &destination.config {
        DestinationConfig::Local { path } => Ok(Box::new(LocalProvider::new(path)?)),
        DestinationConfig::Sftp {
            host,
            port,
            username,
            base_path,
        } => {
            let secrets = secrets.unwrap_or(serde_json::Value::Null);
            let auth = if let Some(key) = secrets.get("private_key").and_then(|v| v.as_str()) {
                SftpAuth::PrivateKey {
                    key_material: key.to_string(),
                    passphrase: secrets
                        .get("private_key_passphrase")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                }
            } else {
                let password = secrets
                    .get("password")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| BackupError::Validation("sftp destination requires password or private key".into()))?;
                SftpAuth::Password(password.to_string())
            };
            Ok(Box::new(SftpProvider::new(
                host.clone(),
                *port,
                username.clone(),
                base_path.clone(),
                auth,
            )))
        }
        DestinationConfig::GoogleDrive { folder_id } => {
            let secrets = secrets.unwrap_or(serde_json::Value::Null);
            let service_account_json = secrets
                .get("service_account_json")
                .and_then(|v| v.as_str())
                .ok_or_else(|| BackupError::Validation("google_drive destination requires service_account_json".into()))?;
            Ok(Box::new(GoogleDriveProvider::new(service_account_json, folder_id.clone())?))
        }
    }
}

/// List a destination's stored backups, optionally scoped to `target_id`'s
/// own naming prefix (REST layer's `/destinations/{id}/backups` surface).
pub async fn list_destination_backups(
    store: &Store,
    destination_id: &str,
    target_id: Option<&str>,
) -> Result<Vec<crate::models::StoredBackup>> {
    let destination = store.get_destination(destination_id)?;
    let secrets = store.resolve_destination_secrets(destination_id)?;
    let provider = build_provider(&destination, secrets)?;
    let prefix = match target_id {
        Some(id) => {
            let target = store.get_target(id)?;
            format!("{}/", naming::sanitize_target_name(&target.name))
        }
        None => String::new(),
    };
    provider.list_backups(&prefix).await
}

/// Download a single stored backup from a destination to `dest_path`.
pub async fn download_destination_backup(store: &Store, destination_id: &str, backup_id: &str, dest_path: &std::path::Path) -> Result<()> {
    let destination = store.get_destination(destination_id)?;
    let secrets = store.resolve_destination_secrets(destination_id)?;
    let provider = build_provider(&destination, secrets)?;
    provider.validate_backup_id(backup_id).await?;
    provider.download_backup(backup_id, dest_path).await
}

/// Delete a single stored backup from a destination.
pub async fn delete_destination_backup(store: &Store, destination_id: &str, backup_id: &str, name: &str) -> Result<()> {
    let destination = store.get_destination(destination_id)?;
    let secrets = store.resolve_destination_secrets(destination_id)?;
    let provider = build_provider(&destination, secrets)?;
    provider.validate_backup_id(backup_id).await?;
    let backup = crate::models::StoredBackup {
        id: backup_id.to_string(),
        name: name.to_string(),
        created_at: Utc::now(),
        size: None,
    };
    provider.delete_backups(std::slice::from_ref(&backup)).await
}

/// Finalization state. `Drop` performs run/audit bookkeeping, schedule
/// advancement, and lock release on every exit path — success, a `?`
/// from any step, or a panic unwind.
struct PipelineFinalizer<'a> {
    store: &'a Store,
    run_id: String,
    audit_id: String,
    schedule: Option<Schedule>,
    status: RunStatus,
    backup_filename: Option<String>,
    details: serde_json::Value,
    error_message: Option<String>,
    _lock_guard: LockGuard<'a>,
}

impl Drop for PipelineFinalizer<'_> {
    fn drop(&mut self) {
        let _ = self.store.finish_run(
            &self.run_id,
            self.status,
            self.backup_filename.as_deref(),
            Some(&self.details),
            self.error_message.as_deref(),
        );
        let _ = self.store.finish_audit_event(
            &self.audit_id,
            self.status,
            None,
            Some(&self.details),
            self.error_message.as_deref(),
        );
        if let Some(schedule) = &self.schedule {
            let next = next_fire(schedule.interval_seconds, schedule.retention.run_at_time.as_deref(), Utc::now());
            let _ = self.store.advance_schedule(&schedule.id, Some(next), Utc::now());
        }
    }
}

/// Run the execution pipeline to completion, acquiring the operation
/// lock for its duration (§4.7) and guaranteeing cleanup via
/// [`PipelineFinalizer`]'s `Drop` impl (§4.3 closing paragraph).
pub async fn run_backup(store: &Store, lock: &OperationLock, notifier: &dyn Notifier, trigger: PipelineTrigger) -> Result<PipelineOutcome> {
    let lock_guard = lock.acquire(LockOperation::Backup)?;

    let (target_id, destination_ids, schedule, trigger_kind, manual_password) = match &trigger {
        PipelineTrigger::Scheduled(schedule) => (
            schedule.target_id.clone(),
            schedule.destination_ids.clone(),
            Some(schedule.clone()),
            Trigger::Scheduled,
            None,
        ),
        PipelineTrigger::Manual {
            target_id,
            destination_ids,
            encryption_password,
        } => {
            if destination_ids.is_empty() {
                return Err(BackupError::Validation(
                    "a manual backup requires at least one destination".into(),
                ));
            }
            (
                target_id.clone(),
                destination_ids.clone(),
                None,
                Trigger::Manual,
                encryption_password.clone(),
            )
        }
    };

    let target = store.get_target(&target_id)?;
    let run = store.create_run(schedule.as_ref().map(|s| s.id.as_str()))?;
    let audit = store.create_audit_event(
        "backup",
        trigger_kind,
        RunStatus::Started,
        Some((&target.id, &target.name)),
        None,
        schedule.as_ref().map(|s| (s.id.as_str(), s.name.as_str())),
        Some(&run.id),
        None,
    )?;

    let mut finalizer = PipelineFinalizer {
        store,
        run_id: run.id.clone(),
        audit_id: audit.id.clone(),
        schedule: schedule.clone(),
        status: RunStatus::Failed,
        backup_filename: None,
        details: serde_json::json!({}),
        error_message: Some("pipeline did not reach a terminal step".to_string()),
        _lock_guard: lock_guard,
    };

    let encrypt = schedule.as_ref().map(|s| s.retention.encrypt).unwrap_or(false) || manual_password.is_some();
    let encryption_password = manual_password.or_else(|| schedule.as_ref().and_then(|s| s.retention.encryption_password.clone()));

    let result = execute_backup_steps(
        store,
        &target,
        &destination_ids,
        schedule.as_ref(),
        encrypt,
        encryption_password.as_deref(),
        &run.id,
    )
    .await;

    match &result {
        Ok((filename, details)) => {
            finalizer.status = RunStatus::Success;
            finalizer.backup_filename = Some(filename.clone());
            finalizer.details = details.clone();
            finalizer.error_message = None;
        }
        Err(e) => {
            finalizer.status = RunStatus::Failed;
            finalizer.error_message = Some(e.to_string());
        }
    }

    let notify_outcome = notifier
        .notify(&NotificationEvent {
            operation: "backup".to_string(),
            status: finalizer.status,
            target_name: Some(target.name.clone()),
            schedule_name: finalizer.schedule.as_ref().map(|s| s.name.clone()),
            error_message: finalizer.error_message.clone(),
        })
        .await;
    if let Some(details) = finalizer.details.as_object_mut() {
        details.insert("notifications".to_string(), serde_json::to_value(&notify_outcome).unwrap_or(serde_json::Value::Null));
    }

    let outcome = PipelineOutcome {
        run_id: finalizer.run_id.clone(),
        status: finalizer.status,
        backup_filename: finalizer.backup_filename.clone(),
        error_message: finalizer.error_message.clone(),
        details: finalizer.details.clone(),
    };

    result.map(|_| outcome).or(Ok(outcome))
}

async fn execute_backup_steps(
    store: &Store,
    target: &Target,
    destination_ids: &[String],
    schedule: Option<&Schedule>,
    encrypt: bool,
    encryption_password: Option<&str>,
    run_id: &str,
) -> Result<(String, serde_json::Value)> {
    let temp_dir = tempfile::tempdir()?;
    let secrets = store.resolve_target_secrets(&target.id)?;
    let adapter = build_adapter(target, secrets)?;

    let (_adapter_filename, artifact_path) = adapter.create_backup_to_temp(temp_dir.path(), true).await?;

    let sanitized_name = naming::sanitize_target_name(&target.name);
    let prefix = match schedule {
        Some(s) => naming::scheduled_prefix(&s.id),
        None => naming::manual_prefix(&target.name),
    };
    let stem = naming::artifact_stem(target.db_type, Utc::now());
    let suffix = artifact_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut final_filename = format!("{prefix}{stem}{suffix}");

    let mut upload_source = artifact_path.clone();
    if encrypt {
        let password = encryption_password
            .ok_or_else(|| BackupError::Validation("retention.encrypt is set but no password was supplied".into()))?;
        let encrypted_path = temp_dir.path().join(format!("{final_filename}.enc"));
        crypto::encrypt_file(&artifact_path, &encrypted_path, password)?;
        final_filename.push_str(".enc");
        upload_source = encrypted_path;
    }

    let mut uploads = Vec::new();
    for destination_id in destination_ids {
        let destination = store.get_destination(destination_id)?;
        let dest_secrets = store.resolve_destination_secrets(destination_id)?;
        let provider = build_provider(&destination, dest_secrets)?;
        let dest_name = naming::upload_path(&target.name, &final_filename);
        let stored = provider.upload_backup(&upload_source, &dest_name).await?;
        uploads.push(serde_json::json!({
            "destination_id": destination.id,
            "backup_id": stored.id,
            "name": stored.name,
            "size": stored.size,
            "created_at": stored.created_at,
        }));
    }

    let mut retention_actions = Vec::new();
    if let Some(schedule) = schedule {
        let sweep_prefix = format!("{sanitized_name}/{}", naming::scheduled_prefix(&schedule.id));
        for destination_id in destination_ids {
            let destination = store.get_destination(destination_id)?;
            let dest_secrets = store.resolve_destination_secrets(destination_id)?;
            let provider = build_provider(&destination, dest_secrets)?;
            let listing = provider.list_backups(&sweep_prefix).await?;
            let (_keep, delete) = retention::plan_retention(listing, &schedule.retention, Utc::now());
            if delete.is_empty() {
                continue;
            }
            let delete_audit = store.create_audit_event(
                "delete_backup",
                Trigger::Scheduled,
                RunStatus::Started,
                Some((&target.id, &target.name)),
                Some((&destination.id, &destination.name)),
                Some((&schedule.id, &schedule.name)),
                Some(run_id),
                None,
            )?;
            let delete_result = provider.delete_backups(&delete).await;
            let status = if delete_result.is_ok() { RunStatus::Success } else { RunStatus::Failed };
            let error = delete_result.as_ref().err().map(|e| e.to_string());
            let _ = store.finish_audit_event(&delete_audit.id, status, None, None, error.as_deref());
            retention_actions.push(serde_json::json!({
                "destination_id": destination.id,
                "deleted": delete.iter().map(|b| &b.id).collect::<Vec<_>>(),
                "status": if status == RunStatus::Success { "success" } else { "failed" },
            }));
        }
    }

    let details = serde_json::json!({
        "type": if schedule.is_some() { "scheduled" } else { "manual" },
        "target": { "id": target.id, "name": target.name, "db_type": target.db_type },
        "encrypted": encrypt,
        "uploads": uploads,
        "retention": retention_actions,
    });

    Ok((final_filename, details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_anchor_advances_to_tomorrow_when_equal() {
        let reference = Utc.with_ymd_and_hms(2026, 1, 10, 3, 30, 0).unwrap();
        let next = next_fire(86_400, Some("03:30"), reference);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 11, 3, 30, 0).unwrap());
    }

    #[test]
    fn daily_anchor_fires_later_today_when_reference_before_anchor() {
        let reference = Utc.with_ymd_and_hms(2026, 1, 10, 1, 0, 0).unwrap();
        let next = next_fire(86_400, Some("03:30"), reference);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 10, 3, 30, 0).unwrap());
    }

    #[test]
    fn simple_drift_without_anchor() {
        let reference = Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).unwrap();
        let next = next_fire(3600, None, reference);
        assert_eq!(next, reference + chrono::Duration::hours(1));
    }

    #[test]
    fn concrete_scenario_1_matches_spec() {
        // Schedule created 2026-01-10T04:00Z, daily at 03:30 -> next run 2026-01-11T03:30Z.
        let reference = Utc.with_ymd_and_hms(2026, 1, 10, 4, 0, 0).unwrap();
        let next = next_fire(86_400, Some("03:30"), reference);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 1, 11, 3, 30, 0).unwrap());
    }
}
