//! Resume planning from persisted chunk state

use std::collections::BTreeSet;

use crate::models::SyncJob;

/// Work left on a job, rebuilt from what the store holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePlan {
    /// Chunk indices to process, ascending
    pub queue: Vec<usize>,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
    /// Chunks never attempted or interrupted before finishing
    pub chunks_remaining: usize,
}

/// Chunks a resumed run must process: every recorded failure plus every
/// unfinished chunk after the last success. Succeeded chunks never appear.
pub fn build_resume_queue(job: &SyncJob) -> Vec<usize> {
    let last_succeeded = job.last_succeeded_index();

    let mut queue: BTreeSet<usize> = job.failed_chunks.iter().map(|f| f.chunk_index).collect();
    queue.extend(
        job.chunks
            .iter()
            .filter(|c| !c.is_succeeded() && last_succeeded.is_none_or(|last| c.index > last))
            .map(|c| c.index),
    );

    queue
        .into_iter()
        .filter(|&index| job.chunk(index).is_some_and(|c| !c.is_succeeded()))
        .collect()
}

pub fn plan_resume(job: &SyncJob) -> ResumePlan {
    let queue = build_resume_queue(job);
    let chunks_succeeded = job.chunks.iter().filter(|c| c.is_succeeded()).count();
    let chunks_failed = job.failed_chunks.len();
    ResumePlan {
        chunks_remaining: queue.len().saturating_sub(chunks_failed),
        queue,
        chunks_succeeded,
        chunks_failed,
    }
}
