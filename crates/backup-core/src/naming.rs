//! Artifact filename grammar.
//!
//! ```text
//! <prefix><stem><suffix>[.enc]
//! prefix  := "sched-<schedule_id>-" | "manual-<sanitized_target_name>-" | ""
//! stem    := "backup_<db_type>_<YYYYMMDD_HHMMSS>"
//! suffix  := ".sql" | ".sql.gz" | ".cypher" | ".cypher.gz" | ".db" | ".db.gz"
//! ```

use chrono::{DateTime, Utc};

use crate::models::DbType;

/// Lowercase the name, replace any character outside `[A-Za-z0-9_-]` with
/// `_`, collapse runs of `_`, and strip leading/trailing `_`.
pub fn sanitize_target_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_underscore = false;
    for c in name.to_lowercase().chars() {
        let keep = c.is_ascii_alphanumeric() || c == '_' || c == '-';
        let c = if keep { c } else { '_' };
        if c == '_' {
            if last_was_underscore {
                continue;
            }
            last_was_underscore = true;
        } else {
            last_was_underscore = false;
        }
        out.push(c);
    }
    out.trim_matches('_').to_string()
}

/// `backup_<db_type>_<YYYYMMDD_HHMMSS>`
pub fn artifact_stem(db_type: DbType, at: DateTime<Utc>) -> String {
    format!("backup_{}_{}", db_type.as_str(), at.format("%Y%m%d_%H%M%S"))
}

/// Prefix for a scheduled run's artifacts, also used as the retention
/// sweep prefix for that schedule.
pub fn scheduled_prefix(schedule_id: &str) -> String {
    format!("sched-{schedule_id}-")
}

/// Prefix for a manual run's artifact. Manual runs are never swept by
/// retention.
pub fn manual_prefix(target_name: &str) -> String {
    format!("manual-{}-", sanitize_target_name(target_name))
}

/// The upload path for an artifact under a destination: always namespaced
/// by the target so that distinct targets never collide in one
/// destination's listing.
pub fn upload_path(target_name: &str, filename: &str) -> String {
    format!("{}/{}", sanitize_target_name(target_name), filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize_target_name("  Pg  Main!! "), "pg_main");
        assert_eq!(sanitize_target_name("already-ok"), "already-ok");
        assert_eq!(sanitize_target_name("__leading"), "leading");
    }

    #[test]
    fn scheduled_prefix_matches_grammar() {
        assert_eq!(scheduled_prefix("abc123"), "sched-abc123-");
    }

    #[test]
    fn manual_prefix_sanitizes_target_name() {
        assert_eq!(manual_prefix("Pg Main"), "manual-pg_main-");
    }

    #[test]
    fn upload_path_is_target_scoped() {
        assert_eq!(
            upload_path("Pg Main", "sched-1-backup_postgresql_20260101_030000.sql.gz"),
            "pg_main/sched-1-backup_postgresql_20260101_030000.sql.gz"
        );
    }
}
