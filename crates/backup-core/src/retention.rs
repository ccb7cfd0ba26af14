//! Pure retention planning.
//!
//! Given a list of stored artifacts and a policy, returns disjoint
//! `(keep, delete)` partitions. No I/O; callers are responsible for
//! actually deleting the `delete` partition through a storage provider.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Utc};

use crate::models::{RetentionMode, RetentionPolicy, StoredBackup};

/// Sort newest-first; ties break on `id` ascending so the ordering is
/// deterministic across runs with identical timestamps.
fn sort_newest_first(mut backups: Vec<StoredBackup>) -> Vec<StoredBackup> {
    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
    backups
}

fn iso_week_index(at: DateTime<Utc>) -> i64 {
    let week = at.iso_week();
    week.year() as i64 * 53 + week.week() as i64
}

fn month_index(at: DateTime<Utc>) -> i64 {
    at.year() as i64 * 12 + at.month() as i64
}

/// `(keep, delete)` for a single-tier "within N days is unique" bucket
/// sweep, applied across daily/weekly/monthly/yearly in order of
/// granularity.
fn plan_smart(
    sorted: &[StoredBackup],
    keep_last: usize,
    daily: usize,
    weekly: usize,
    monthly: usize,
    yearly: usize,
    now: DateTime<Utc>,
) -> Vec<bool> {
    let mut keep_mask = vec![false; sorted.len()];
    for m in keep_mask.iter_mut().take(keep_last.min(sorted.len())) {
        *m = true;
    }

    let now_week = iso_week_index(now);
    let now_month = month_index(now);

    let mut daily_seen: HashSet<chrono::NaiveDate> = HashSet::new();
    let mut weekly_seen: HashSet<i64> = HashSet::new();
    let mut monthly_seen: HashSet<i64> = HashSet::new();
    let mut yearly_seen: HashSet<i32> = HashSet::new();

    for (i, backup) in sorted.iter().enumerate().skip(keep_last) {
        let age_days = (now.date_naive() - backup.created_at.date_naive()).num_days();
        let week_delta = now_week - iso_week_index(backup.created_at);
        let month_delta = now_month - month_index(backup.created_at);
        let year_delta = now.year() - backup.created_at.year();

        if (age_days as i64) < daily as i64 {
            if daily_seen.insert(backup.created_at.date_naive()) {
                keep_mask[i] = true;
            }
        } else if week_delta < weekly as i64 {
            if weekly_seen.insert(iso_week_index(backup.created_at)) {
                keep_mask[i] = true;
            }
        } else if month_delta < monthly as i64 {
            if monthly_seen.insert(month_index(backup.created_at)) {
                keep_mask[i] = true;
            }
        } else if year_delta < yearly as i64 {
            if yearly_seen.insert(backup.created_at.year()) {
                keep_mask[i] = true;
            }
        }
    }

    keep_mask
}

fn apply_min_max_bounds(
    sorted: &[StoredBackup],
    mut keep_mask: Vec<bool>,
    min_backups: Option<usize>,
    max_backups: Option<usize>,
) -> Vec<bool> {
    if let Some(max) = max_backups {
        let kept = keep_mask.iter().filter(|k| **k).count();
        if kept > max {
            let mut overflow = kept - max;
            // Oldest kept items are at the end of the newest-first list.
            for i in (0..sorted.len()).rev() {
                if overflow == 0 {
                    break;
                }
                if keep_mask[i] {
                    keep_mask[i] = false;
                    overflow -= 1;
                }
            }
        }
    }
    if let Some(min) = min_backups {
        let kept = keep_mask.iter().filter(|k| **k).count();
        if kept < min {
            let mut needed = min - kept;
            for i in 0..sorted.len() {
                if needed == 0 {
                    break;
                }
                if !keep_mask[i] {
                    keep_mask[i] = true;
                    needed -= 1;
                }
            }
        }
    }
    keep_mask
}

/// Plan retention for `backups` under `policy`, returning `(keep, delete)`.
///
/// The union of the two return values equals the input (as a multiset);
/// their intersection is empty.
pub fn plan_retention(
    backups: Vec<StoredBackup>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> (Vec<StoredBackup>, Vec<StoredBackup>) {
    let sorted = sort_newest_first(backups);
    let n = sorted.len();

    let mut keep_mask = match &policy.mode {
        RetentionMode::LastN { keep_last } => {
            let mut mask = vec![false; n];
            for m in mask.iter_mut().take((*keep_last).min(n)) {
                *m = true;
            }
            mask
        }
        RetentionMode::MaxAgeDays {
            max_age_days,
            keep_last,
        } => {
            let mut mask = vec![false; n];
            for (i, backup) in sorted.iter().enumerate() {
                if i < *keep_last {
                    mask[i] = true;
                    continue;
                }
                let age_days = (now.date_naive() - backup.created_at.date_naive()).num_days();
                if age_days <= *max_age_days {
                    mask[i] = true;
                }
            }
            mask
        }
        RetentionMode::MaxSize {
            max_size_bytes,
            keep_last,
        } => {
            let mut mask = vec![false; n];
            let mut total: u64 = 0;
            for (i, backup) in sorted.iter().enumerate() {
                if i < *keep_last {
                    mask[i] = true;
                    total += backup.size.unwrap_or(0);
                    continue;
                }
                let size = backup.size.unwrap_or(0);
                if total + size <= *max_size_bytes {
                    mask[i] = true;
                    total += size;
                }
            }
            mask
        }
        RetentionMode::Smart {
            profile,
            daily,
            weekly,
            monthly,
            yearly,
            keep_last,
        } => {
            let default_profile = crate::models::SmartProfile::Medium;
            let (p_daily, p_weekly, p_monthly, p_yearly) =
                profile.unwrap_or(default_profile).defaults();
            plan_smart(
                &sorted,
                *keep_last,
                daily.unwrap_or(p_daily),
                weekly.unwrap_or(p_weekly),
                monthly.unwrap_or(p_monthly),
                yearly.unwrap_or(p_yearly),
                now,
            )
        }
    };

    keep_mask = apply_min_max_bounds(&sorted, keep_mask, policy.min_backups, policy.max_backups);

    let mut keep = Vec::new();
    let mut delete = Vec::new();
    for (backup, keep_it) in sorted.into_iter().zip(keep_mask.into_iter()) {
        if keep_it {
            keep.push(backup);
        } else {
            delete.push(backup);
        }
    }
    (keep, delete)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RetentionMode, SmartProfile};
    use chrono::Duration;

    fn backup(id: &str, days_ago: i64) -> StoredBackup {
        StoredBackup {
            id: id.to_string(),
            name: format!("{id}.sql.gz"),
            created_at: Utc::now() - Duration::days(days_ago),
            size: Some(1024),
        }
    }

    fn policy(mode: RetentionMode) -> RetentionPolicy {
        RetentionPolicy {
            mode,
            min_backups: None,
            max_backups: None,
            run_at_time: None,
            encrypt: false,
            encryption_password: None,
        }
    }

    #[test]
    fn empty_listing_returns_empty_partitions() {
        let (keep, delete) = plan_retention(vec![], &policy(RetentionMode::LastN { keep_last: 5 }), Utc::now());
        assert!(keep.is_empty());
        assert!(delete.is_empty());
    }

    #[test]
    fn last_n_keeps_newest_k() {
        let backups: Vec<_> = (0..10).map(|i| backup(&format!("b{i}"), i)).collect();
        let (keep, delete) = plan_retention(
            backups.clone(),
            &policy(RetentionMode::LastN { keep_last: 3 }),
            Utc::now(),
        );
        assert_eq!(keep.len(), 3);
        assert_eq!(delete.len(), 7);
        let kept_ids: HashSet<_> = keep.iter().map(|b| b.id.clone()).collect();
        assert!(kept_ids.contains("b0"));
        assert!(kept_ids.contains("b1"));
        assert!(kept_ids.contains("b2"));
    }

    #[test]
    fn partitions_are_disjoint_and_cover_input() {
        let backups: Vec<_> = (0..30).map(|i| backup(&format!("b{i}"), i)).collect();
        let pol = policy(RetentionMode::Smart {
            profile: Some(SmartProfile::Medium),
            daily: None,
            weekly: None,
            monthly: None,
            yearly: None,
            keep_last: 1,
        });
        let (keep, delete) = plan_retention(backups, &pol, Utc::now());
        assert_eq!(keep.len() + delete.len(), 30);
        let keep_ids: HashSet<_> = keep.iter().map(|b| b.id.clone()).collect();
        let delete_ids: HashSet<_> = delete.iter().map(|b| b.id.clone()).collect();
        assert!(keep_ids.is_disjoint(&delete_ids));
    }

    #[test]
    fn max_backups_clamp_demotes_oldest_kept() {
        let backups: Vec<_> = (0..5).map(|i| backup(&format!("b{i}"), i)).collect();
        let mut pol = policy(RetentionMode::LastN { keep_last: 5 });
        pol.max_backups = Some(2);
        let (keep, _delete) = plan_retention(backups, &pol, Utc::now());
        assert_eq!(keep.len(), 2);
        let kept_ids: HashSet<_> = keep.iter().map(|b| b.id.clone()).collect();
        assert!(kept_ids.contains("b0"));
        assert!(kept_ids.contains("b1"));
    }

    #[test]
    fn min_backups_clamp_promotes_newest_deleted() {
        let backups: Vec<_> = (0..5).map(|i| backup(&format!("b{i}"), i)).collect();
        let mut pol = policy(RetentionMode::LastN { keep_last: 1 });
        pol.min_backups = Some(3);
        let (keep, _delete) = plan_retention(backups, &pol, Utc::now());
        assert_eq!(keep.len(), 3);
        let kept_ids: HashSet<_> = keep.iter().map(|b| b.id.clone()).collect();
        assert!(kept_ids.contains("b0"));
        assert!(kept_ids.contains("b1"));
        assert!(kept_ids.contains("b2"));
    }

    #[test]
    fn max_age_days_preserves_keep_last_regardless_of_age() {
        let mut backups: Vec<_> = (0..3).map(|i| backup(&format!("recent{i}"), i)).collect();
        backups.push(backup("ancient", 1000));
        let pol = policy(RetentionMode::MaxAgeDays {
            max_age_days: 30,
            keep_last: 4,
        });
        let (keep, delete) = plan_retention(backups, &pol, Utc::now());
        assert_eq!(keep.len(), 4);
        assert!(delete.is_empty());
    }
}
