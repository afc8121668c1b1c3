//! In-memory storage implementation
//!
//! Used for tests and for hosts that do not need jobs to outlive the process.

use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::JobStore;
use crate::models::{JobId, SyncJob, SyncType};

/// In-memory arena of job records keyed by id
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, SyncJob>>,
}

impl InMemoryJobStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, SyncJob>>> {
        self.jobs.read().map_err(|_| anyhow!("job store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, SyncJob>>> {
        self.jobs.write().map_err(|_| anyhow!("job store lock poisoned"))
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(mut jobs: Vec<SyncJob>) -> Vec<SyncJob> {
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    jobs
}

impl JobStore for InMemoryJobStore {
    fn load(&self, id: &JobId) -> Result<Option<SyncJob>> {
        Ok(self.read()?.get(id).cloned())
    }

    fn save(&self, job: &SyncJob) -> Result<()> {
        // The record is cloned before taking the lock so the swap is a single insert
        let record = job.clone();
        self.write()?.insert(record.id.clone(), record);
        Ok(())
    }

    fn list_jobs(&self, device_id: &str, sync_type: Option<SyncType>) -> Result<Vec<SyncJob>> {
        let jobs = self
            .read()?
            .values()
            .filter(|job| job.device_id == device_id)
            .filter(|job| sync_type.is_none_or(|t| job.sync_type == t))
            .cloned()
            .collect();
        Ok(newest_first(jobs))
    }

    fn list_all(&self) -> Result<Vec<SyncJob>> {
        Ok(newest_first(self.read()?.values().cloned().collect()))
    }

    fn delete(&self, id: &JobId) -> Result<()> {
        self.write()?.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, DateRange, JobStatus};
    use chrono::{NaiveDate, Utc};

    fn make_job(device: &str, sync_type: SyncType) -> SyncJob {
        let day = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let now = Utc::now().fixed_offset();
        SyncJob::new(device, sync_type, now, now, 7, vec![Chunk::new(0, DateRange::new(day, day))])
    }

    #[test]
    fn test_save_and_load() {
        let store = InMemoryJobStore::new();
        let job = make_job("phone", SyncType::Historical);

        assert!(store.load(&job.id).unwrap().is_none());
        store.save(&job).unwrap();
        assert_eq!(store.load(&job.id).unwrap().unwrap(), job);
    }

    #[test]
    fn test_save_replaces_record() {
        let store = InMemoryJobStore::new();
        let mut job = make_job("phone", SyncType::Historical);
        store.save(&job).unwrap();

        job.status = JobStatus::Running;
        store.save(&job).unwrap();

        assert_eq!(store.load(&job.id).unwrap().unwrap().status, JobStatus::Running);
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_list_filters_by_device_and_type() {
        let store = InMemoryJobStore::new();
        store.save(&make_job("phone", SyncType::Historical)).unwrap();
        store.save(&make_job("phone", SyncType::Incremental)).unwrap();
        store.save(&make_job("tablet", SyncType::Historical)).unwrap();

        assert_eq!(store.list_jobs("phone", None).unwrap().len(), 2);
        assert_eq!(
            store.list_jobs("phone", Some(SyncType::Historical)).unwrap().len(),
            1
        );
        assert!(store.list_jobs("watch", None).unwrap().is_empty());
    }

    #[test]
    fn test_delete() {
        let store = InMemoryJobStore::new();
        let job = make_job("phone", SyncType::Historical);
        store.save(&job).unwrap();
        store.delete(&job.id).unwrap();
        assert!(store.load(&job.id).unwrap().is_none());
    }
}
