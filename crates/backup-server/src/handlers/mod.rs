//! HTTP handlers, one module per resource family.

pub mod audit;
pub mod backup;
pub mod backups;
pub mod destinations;
pub mod runs;
pub mod schedules;
pub mod targets;

pub(crate) fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 1000)
}

pub(crate) fn clamp_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}
