//! Backup orchestration engine CLI
//!
//! Usage:
//!   backup serve --port 8080                 Start the REST server + runner
//!   backup targets add pg-main --file t.json  Register a backup target
//!   backup backup-now --target-id ID --use-local-storage
//!   backup schedules run-due                  Run whatever is currently due

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let data_dir = commands::resolve_data_dir(cli.data_dir);

    match cli.command {
        Commands::Serve { host, port } => commands::serve::cmd_serve(&data_dir, &host, port).await,

        Commands::Targets { action } => match action {
            TargetsAction::Add { name, file } => commands::targets::cmd_targets_add(&data_dir, &name, &file),
            TargetsAction::List => commands::targets::cmd_targets_list(&data_dir),
            TargetsAction::Get { id } => commands::targets::cmd_targets_get(&data_dir, &id),
            TargetsAction::SetActive { id, active } => commands::targets::cmd_targets_set_active(&data_dir, &id, active),
            TargetsAction::Delete { id } => commands::targets::cmd_targets_delete(&data_dir, &id),
            TargetsAction::TestConnection { id } => commands::targets::cmd_targets_test_connection(&data_dir, &id).await,
        },

        Commands::Destinations { action } => match action {
            DestinationsAction::Add { name, file } => commands::destinations::cmd_destinations_add(&data_dir, &name, &file),
            DestinationsAction::List => commands::destinations::cmd_destinations_list(&data_dir),
            DestinationsAction::Get { id } => commands::destinations::cmd_destinations_get(&data_dir, &id),
            DestinationsAction::SetActive { id, active } => commands::destinations::cmd_destinations_set_active(&data_dir, &id, active),
            DestinationsAction::Delete { id } => commands::destinations::cmd_destinations_delete(&data_dir, &id),
            DestinationsAction::Backups { id, target_id } => {
                commands::destinations::cmd_destinations_backups(&data_dir, &id, target_id.as_deref()).await
            }
            DestinationsAction::Download { id, backup_id, out } => {
                commands::destinations::cmd_destinations_download(&data_dir, &id, &backup_id, &out).await
            }
            DestinationsAction::DeleteBackup { id, backup_id, name } => {
                commands::destinations::cmd_destinations_delete_backup(&data_dir, &id, &backup_id, &name).await
            }
        },

        Commands::Schedules { action } => match action {
            SchedulesAction::Add { name, file } => commands::schedules::cmd_schedules_add(&data_dir, &name, &file),
            SchedulesAction::List => commands::schedules::cmd_schedules_list(&data_dir),
            SchedulesAction::Get { id } => commands::schedules::cmd_schedules_get(&data_dir, &id),
            SchedulesAction::Delete { id } => commands::schedules::cmd_schedules_delete(&data_dir, &id),
            SchedulesAction::Enable { id } => commands::schedules::cmd_schedules_enable(&data_dir, &id),
            SchedulesAction::Disable { id } => commands::schedules::cmd_schedules_disable(&data_dir, &id),
            SchedulesAction::RunNow { id } => commands::schedules::cmd_schedules_run_now(&data_dir, &id).await,
            SchedulesAction::RunEnabledNow => commands::schedules::cmd_schedules_run_enabled_now(&data_dir).await,
        },

        Commands::BackupNow {
            target_id,
            destination_ids,
            use_local_storage,
            encryption_password,
        } => commands::backup::cmd_backup_now(&data_dir, &target_id, destination_ids, use_local_storage, encryption_password).await,

        Commands::RestoreNow {
            target_id,
            destination_id,
            use_local_storage,
            backup_id,
            encryption_password,
            confirm,
        } => {
            commands::backup::cmd_restore_now(&data_dir, &target_id, destination_id, use_local_storage, &backup_id, encryption_password, &confirm)
                .await
        }

        Commands::Runs { action } => match action {
            RunsAction::List { limit, offset } => commands::runs::cmd_runs_list(&data_dir, limit, offset),
            RunsAction::Get { id } => commands::runs::cmd_runs_get(&data_dir, &id),
            RunsAction::Delete { id } => commands::runs::cmd_runs_delete(&data_dir, &id),
        },

        Commands::Audit { action } => match action {
            AuditAction::List { target_id, operation, trigger, limit, offset } => {
                commands::audit::cmd_audit_list(&data_dir, target_id.as_deref(), operation.as_deref(), trigger.as_deref(), limit, offset)
            }
            AuditAction::Get { id } => commands::audit::cmd_audit_get(&data_dir, &id),
        },

        Commands::RunDue => commands::schedules::cmd_run_due(&data_dir).await,
    }
}
