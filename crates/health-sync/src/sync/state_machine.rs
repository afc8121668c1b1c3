//! Job lifecycle transitions
//!
//! [`JobStateMachine`] owns a job while it is being driven. Each mutation is
//! validated, then the full job is saved and observers are notified before
//! the call returns, so the store always matches the last step a caller saw.

use chrono::Utc;
use log::{debug, info, warn};

use super::SyncError;
use super::snapshot::{JobSnapshot, SyncObserver};
use crate::models::{Chunk, ChunkStatus, FailedChunk, JobStatus, Stage, SyncJob};
use crate::storage::JobStore;

/// Rejected job or chunk mutation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move job from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("job cannot complete: {completed} of {total} chunks succeeded, {failed} failed")]
    Incomplete {
        completed: usize,
        total: usize,
        failed: usize,
    },

    #[error("job is {0}, chunk work requires a running job")]
    NotRunning(JobStatus),

    #[error("job has no chunk {0}")]
    UnknownChunk(usize),

    #[error("chunk {0} already succeeded")]
    ChunkSucceeded(usize),

    #[error("chunk {0} is already in progress")]
    ChunkInProgress(usize),
}

pub struct JobStateMachine<'a> {
    job: SyncJob,
    store: &'a dyn JobStore,
    observer: Option<&'a dyn SyncObserver>,
}

impl<'a> JobStateMachine<'a> {
    pub fn new(job: SyncJob, store: &'a dyn JobStore) -> Self {
        Self {
            job,
            store,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn job(&self) -> &SyncJob {
        &self.job
    }

    pub fn into_job(self) -> SyncJob {
        self.job
    }

    /// Save a freshly planned job
    pub fn create(&mut self) -> Result<(), SyncError> {
        info!(
            "Created {} job {} with {} chunks",
            self.job.sync_type, self.job.id, self.job.chunks_total
        );
        self.persist()
    }

    /// Move the job to `to`, persisting the result
    pub fn transition(&mut self, to: JobStatus) -> Result<(), SyncError> {
        self.apply_status(to)?;
        self.persist()
    }

    /// Mark chunk `index` in progress and count the attempt
    pub fn begin_chunk(&mut self, index: usize) -> Result<(), SyncError> {
        self.ensure_running()?;
        let chunk = self
            .job
            .chunks
            .get_mut(index)
            .ok_or(TransitionError::UnknownChunk(index))?;
        match chunk.status {
            ChunkStatus::Succeeded => return Err(TransitionError::ChunkSucceeded(index).into()),
            ChunkStatus::InProgress => return Err(TransitionError::ChunkInProgress(index).into()),
            ChunkStatus::Pending | ChunkStatus::Failed => {}
        }
        chunk.status = ChunkStatus::InProgress;
        chunk.attempts += 1;
        let label = chunk.range().label();
        debug!(
            "Job {} chunk {} attempt {}: {}",
            self.job.id, index, chunk.attempts, label
        );

        self.job.current_chunk_index = Some(index);
        self.job.current_chunk_range = Some(label);
        self.job.current_stage = None;
        self.persist()
    }

    pub fn enter_stage(&mut self, stage: Stage) -> Result<(), SyncError> {
        self.ensure_running()?;
        self.job.current_stage = Some(stage);
        self.persist()
    }

    /// Record chunk `index` as succeeded
    pub fn complete_chunk(&mut self, index: usize) -> Result<(), SyncError> {
        self.ensure_running()?;
        let chunk = self.chunk_mut(index)?;
        chunk.status = ChunkStatus::Succeeded;
        chunk.last_error = None;
        self.job.failed_chunks.retain(|f| f.chunk_index != index);
        self.job.recount();
        self.job.current_stage = None;
        self.persist()
    }

    /// Record a chunk-scoped failure; the job keeps running
    pub fn fail_chunk(&mut self, index: usize, error: &str) -> Result<(), SyncError> {
        self.ensure_running()?;
        self.record_chunk_failure(index, error)?;
        self.job.current_stage = None;
        self.persist()
    }

    /// Hand an interrupted chunk back so a later resume picks it up again
    pub fn release_chunk(&mut self, index: usize) -> Result<(), SyncError> {
        self.release_in_memory(index)?;
        self.job.current_stage = None;
        self.persist()
    }

    /// Stop the job on a fatal error raised while processing `index`
    pub fn fail_job(&mut self, index: Option<usize>, message: String) -> Result<(), SyncError> {
        if let Some(index) = index {
            self.record_chunk_failure(index, &message)?;
        }
        self.apply_status(JobStatus::Failed)?;
        warn!("Job {} failed: {}", self.job.id, message);
        self.job.error_message = Some(message);
        self.persist()
    }

    /// Close out a run that reached the end of its queue
    ///
    /// Completes the job when every chunk succeeded; otherwise leaves it
    /// `failed` with the failures awaiting a resume.
    pub fn finish(&mut self) -> Result<JobStatus, SyncError> {
        self.job.recount();
        let next = if self.job.is_fully_synced() {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.apply_status(next)?;
        self.persist()?;
        Ok(next)
    }

    /// Park a job left `running` by a process that no longer exists
    pub fn recover(&mut self) -> Result<(), SyncError> {
        let stale: Vec<usize> = self
            .job
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::InProgress)
            .map(|c| c.index)
            .collect();
        for index in stale {
            self.release_in_memory(index)?;
        }
        if self.job.status == JobStatus::Running {
            self.apply_status(JobStatus::Paused)?;
        }
        self.job.recount();
        self.persist()
    }

    /// Cancel from any non-terminal status, releasing chunks left in flight
    pub fn cancel(&mut self) -> Result<(), SyncError> {
        let in_flight: Vec<usize> = self
            .job
            .chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::InProgress)
            .map(|c| c.index)
            .collect();
        for index in in_flight {
            self.release_in_memory(index)?;
        }
        self.transition(JobStatus::Cancelled)
    }

    fn apply_status(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        let from = self.job.status;
        if !from.can_transition_to(to) {
            return Err(TransitionError::InvalidTransition { from, to });
        }
        if to == JobStatus::Completed && !self.job.is_fully_synced() {
            return Err(TransitionError::Incomplete {
                completed: self.job.chunks_completed,
                total: self.job.chunks_total,
                failed: self.job.failed_chunks.len(),
            });
        }

        self.job.status = to;
        match to {
            JobStatus::Running => {
                self.job.error_message = None;
                self.job.recount();
            }
            JobStatus::Completed => {
                self.job.current_stage = None;
                self.job.current_chunk_index = None;
                self.job.current_chunk_range = None;
            }
            _ => self.job.current_stage = None,
        }
        info!("Job {}: {} -> {}", self.job.id, from, to);
        Ok(())
    }

    fn ensure_running(&self) -> Result<(), TransitionError> {
        match self.job.status {
            JobStatus::Running => Ok(()),
            other => Err(TransitionError::NotRunning(other)),
        }
    }

    fn chunk_mut(&mut self, index: usize) -> Result<&mut Chunk, TransitionError> {
        self.job
            .chunks
            .get_mut(index)
            .ok_or(TransitionError::UnknownChunk(index))
    }

    fn record_chunk_failure(&mut self, index: usize, error: &str) -> Result<(), TransitionError> {
        let chunk = self.chunk_mut(index)?;
        if chunk.is_succeeded() {
            return Err(TransitionError::ChunkSucceeded(index));
        }
        chunk.status = ChunkStatus::Failed;
        chunk.last_error = Some(error.to_string());
        let entry = FailedChunk {
            chunk_index: index,
            attempts: chunk.attempts,
            last_error: error.to_string(),
        };

        let failed = &mut self.job.failed_chunks;
        match failed.binary_search_by_key(&index, |f| f.chunk_index) {
            Ok(pos) => failed[pos] = entry,
            Err(pos) => failed.insert(pos, entry),
        }
        Ok(())
    }

    fn release_in_memory(&mut self, index: usize) -> Result<(), TransitionError> {
        let was_failed = self
            .job
            .failed_chunks
            .iter()
            .any(|f| f.chunk_index == index);
        let chunk = self.chunk_mut(index)?;
        if chunk.status == ChunkStatus::InProgress {
            chunk.status = if was_failed {
                ChunkStatus::Failed
            } else {
                ChunkStatus::Pending
            };
        }
        Ok(())
    }

    fn persist(&mut self) -> Result<(), SyncError> {
        self.job.updated_at = Utc::now();
        self.store.save(&self.job)?;
        if let Some(observer) = self.observer {
            observer.on_update(&JobSnapshot::from_job(&self.job));
        }
        Ok(())
    }
}
