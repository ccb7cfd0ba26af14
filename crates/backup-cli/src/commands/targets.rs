//! Target commands: register, inspect, test the database adapter connection.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use backup_core::{build_adapter, TargetConfig};

use super::{open_store, print_json, read_json_file};

pub fn cmd_targets_add(data_dir: &Path, name: &str, file: &PathBuf) -> Result<()> {
    let store = open_store(data_dir)?;
    let doc = read_json_file(file)?;
    let config: TargetConfig = serde_json::from_value(doc.get("config").cloned().context("missing \"config\" field")?)?;
    let secrets = doc.get("secrets").cloned();

    let target = store.create_target(name, config, secrets)?;
    print_json(&target)
}

pub fn cmd_targets_list(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.list_targets()?)
}

pub fn cmd_targets_get(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.get_target(id)?)
}

pub fn cmd_targets_set_active(data_dir: &Path, id: &str, active: bool) -> Result<()> {
    let store = open_store(data_dir)?;
    let target = store.update_target(id, None, None, Some(active))?;
    print_json(&target)
}

pub fn cmd_targets_delete(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    store.delete_target(id)?;
    println!("deleted target {id}");
    Ok(())
}

pub async fn cmd_targets_test_connection(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    let target = store.get_target(id)?;
    let secrets = store.resolve_target_secrets(&target.id)?;
    let adapter = build_adapter(&target, secrets)?;
    adapter.test_connection().await?;
    println!("connection ok: {id}");
    Ok(())
}
