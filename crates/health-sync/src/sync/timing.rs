//! Sync timing utilities for cooldown management
//!
//! Pure functions that can be tested without a running engine.

use chrono::{DateTime, Utc};

use crate::models::{JobStatus, SyncJob, SyncType};

/// Check if enough time has elapsed since the last sync to allow a new sync.
///
/// # Arguments
/// * `last_sync_at` - When the last successful sync completed (None if never synced)
/// * `cooldown_secs` - Minimum seconds that must elapse between syncs
///
/// # Returns
/// `true` if enough time has passed (or never synced), `false` if still in cooldown
pub fn cooldown_elapsed(last_sync_at: Option<DateTime<Utc>>, cooldown_secs: u64) -> bool {
    cooldown_elapsed_at(last_sync_at, cooldown_secs, Utc::now())
}

/// [`cooldown_elapsed`] against an explicit clock
pub fn cooldown_elapsed_at(
    last_sync_at: Option<DateTime<Utc>>,
    cooldown_secs: u64,
    now: DateTime<Utc>,
) -> bool {
    match last_sync_at {
        Some(last) => {
            let elapsed = now - last;
            elapsed.num_seconds() >= i64::try_from(cooldown_secs).unwrap_or(i64::MAX)
        }
        None => true, // Never synced, so cooldown has "elapsed"
    }
}

/// When the most recent completed job of `sync_type` finished
pub fn last_completed_at(jobs: &[SyncJob], sync_type: SyncType) -> Option<DateTime<Utc>> {
    jobs.iter()
        .filter(|job| job.sync_type == sync_type && job.status == JobStatus::Completed)
        .map(|job| job.updated_at)
        .max()
}
