//! Storage trait definitions

use crate::models::{JobId, SyncJob, SyncType};
use anyhow::Result;

/// Durable store of sync jobs and their chunk state
///
/// Records are keyed by job id. `save` replaces the whole record atomically:
/// a crash mid-save leaves either the previous record or the new one, never a
/// mix of both.
pub trait JobStore: Send + Sync {
    /// Load a job with its chunks
    fn load(&self, id: &JobId) -> Result<Option<SyncJob>>;

    /// Insert or replace a job with its chunks
    fn save(&self, job: &SyncJob) -> Result<()>;

    /// Jobs for a device, newest first, optionally filtered by type
    fn list_jobs(&self, device_id: &str, sync_type: Option<SyncType>) -> Result<Vec<SyncJob>>;

    /// Every job in the store, newest first
    fn list_all(&self) -> Result<Vec<SyncJob>>;

    /// Remove a job and its chunks
    fn delete(&self, id: &JobId) -> Result<()>;
}
