//! Read-only job view for presentation layers

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{FailedChunk, JobId, JobStatus, Stage, SyncJob, SyncType};
use crate::progress::job_percent;

/// Point-in-time view of a job, safe to hand to UI code
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub device_id: String,
    pub status: JobStatus,
    pub sync_type: SyncType,
    pub chunks_total: usize,
    pub chunks_completed: usize,
    pub current_chunk_index: Option<usize>,
    pub current_chunk_range: Option<String>,
    pub current_stage: Option<Stage>,
    pub failed_chunks: Vec<FailedChunk>,
    pub error_message: Option<String>,
    /// Overall progress, 0..=100
    pub percent: u8,
    pub updated_at: DateTime<Utc>,
}

impl JobSnapshot {
    pub fn from_job(job: &SyncJob) -> Self {
        Self {
            job_id: job.id.clone(),
            device_id: job.device_id.clone(),
            status: job.status,
            sync_type: job.sync_type,
            chunks_total: job.chunks_total,
            chunks_completed: job.chunks_completed,
            current_chunk_index: job.current_chunk_index,
            current_chunk_range: job.current_chunk_range.clone(),
            current_stage: job.current_stage,
            failed_chunks: job.failed_chunks.clone(),
            error_message: job.error_message.clone(),
            percent: job_percent(job),
            updated_at: job.updated_at,
        }
    }

    pub fn stage_label(&self) -> Option<&'static str> {
        self.current_stage.map(Stage::label)
    }

    /// User-facing note about chunks awaiting retry, if any
    pub fn failure_summary(&self) -> Option<String> {
        match self.failed_chunks.len() {
            0 => None,
            n => Some(format!("{} chunk(s) failed, will retry on resume", n)),
        }
    }
}

impl From<&SyncJob> for JobSnapshot {
    fn from(job: &SyncJob) -> Self {
        Self::from_job(job)
    }
}

/// Receives a snapshot after every persisted step of a job
pub trait SyncObserver: Send + Sync {
    fn on_update(&self, snapshot: &JobSnapshot);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateRange;
    use crate::plan::schedule_chunks;
    use chrono::NaiveDate;

    fn make_job() -> SyncJob {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2026, 3, 21).unwrap(),
        );
        let now = Utc::now().fixed_offset();
        SyncJob::new("phone", SyncType::Historical, now, now, 7, schedule_chunks(range, 7).unwrap())
    }

    #[test]
    fn test_snapshot_reflects_job() {
        let mut job = make_job();
        job.status = JobStatus::Running;
        job.current_stage = Some(Stage::ProcessingHealth);
        job.current_chunk_range = Some(job.chunks[0].range().label());

        let snapshot = JobSnapshot::from_job(&job);
        assert_eq!(snapshot.chunks_total, 3);
        assert_eq!(snapshot.stage_label(), Some("Processing health data..."));
        assert_eq!(
            snapshot.current_chunk_range.as_deref(),
            Some("2026-03-01 to 2026-03-07")
        );
        // (0 + 0.4) / 3 chunks
        assert_eq!(snapshot.percent, 13);
        assert!(snapshot.failure_summary().is_none());
    }

    #[test]
    fn test_failure_summary() {
        let mut job = make_job();
        job.failed_chunks = vec![
            FailedChunk {
                chunk_index: 0,
                attempts: 1,
                last_error: "request timed out".into(),
            },
            FailedChunk {
                chunk_index: 2,
                attempts: 1,
                last_error: "request timed out".into(),
            },
        ];
        let snapshot = JobSnapshot::from_job(&job);
        assert_eq!(
            snapshot.failure_summary().as_deref(),
            Some("2 chunk(s) failed, will retry on resume")
        );
    }
}
