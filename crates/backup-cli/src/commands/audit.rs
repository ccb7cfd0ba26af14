//! Audit log commands.

use std::path::Path;

use anyhow::Result;

use super::{open_store, print_json};

#[allow(clippy::too_many_arguments)]
pub fn cmd_audit_list(
    data_dir: &Path,
    target_id: Option<&str>,
    operation: Option<&str>,
    trigger: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.list_audit_events(target_id, operation, trigger, limit.clamp(1, 1000), offset.max(0))?)
}

pub fn cmd_audit_get(data_dir: &Path, id: &str) -> Result<()> {
    let store = open_store(data_dir)?;
    print_json(&store.get_audit_event(id)?)
}
