//! Destination commands: register, inspect, and manage stored backups.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backup_core::{delete_destination_backup, download_destination_backup, list_destination_backups, DestinationConfig};

use super::{open_store, print_json, read_json_file};

pub fn cmd_destinations_add(data_dir: &Path, name: &str, file: &PathBuf) -> Result<()> {
    let store = open_store(data_dir)?;
    let doc = read_json_file(file)?;
    let config: DestinationConfig = serde_json::from_value(doc.get("config").cloned().context("missing \"config\" field")?)?;
    let secrets = doc.get("secrets").cloned();

    let destination = store.create_destination(name, config, secrets)?;
    print_json(&destination)
}

pub fn cmd_destinations_list(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.list_destinations()?)
}

pub fn cmd_destinations_get(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.get_destination(id)?)
}

pub fn cmd_destinations_set_active(data_dir: &Path, id: &str, active: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let destination = store.update_destination(id, None, None, Some(active))?;
    print_json(&destination)
}

pub fn cmd_destinations_delete(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    store.delete_destination(id)?;
    println!("deleted destination {id}");
    Ok(())
}

pub async fn cmd_destinations_backups(data_dir: &Path, id: &str, target_id: Option<&str>) -> Result<()> {
    let store = open_store(data_dir)?;
    let backups = list_destination_backups(&store, id, target_id).await?;
    print_json(&backups)
}

pub async fn cmd_destinations_download(data_dir: &Path, id: &str, backup_id: &str, out: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    download_destination_backup(&store, id, backup_id, out).await?;
    println!("downloaded {backup_id} to {}", out.display());
    Ok(())
}

pub async fn cmd_destinations_delete_backup(data_dir: &Path, id: &str, backup_id: &str, name: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    delete_destination_backup(&store, id, backup_id, name).await?;
    println!("deleted backup {backup_id} from destination {id}");
    Ok(())
}
