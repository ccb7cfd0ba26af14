//! Run history commands.

use std::path::Path;

use anyhow::Result;

use super::{open_store, print_json};

pub fn cmd_runs_list(data_dir: &Path, limit: i64, offset: i64) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.list_runs(limit.clamp(1, 1000), offset.max(0))?)
}

pub fn cmd_runs_get(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.get_run(id)?)
}

pub fn cmd_runs_delete(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    store.delete_run(id)?;
    println!("deleted run {id}");
    Ok(())
}
