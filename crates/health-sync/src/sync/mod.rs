//! Sync engine for importing health data in resumable chunks
//!
//! Every step is checkpointed through a [`JobStore`](crate::storage::JobStore),
//! so a run can stop at any stage boundary and continue after a restart.

mod classify;
mod control;
mod engine;
mod executor;
mod retry;
mod snapshot;
mod state_machine;
mod timing;

pub use classify::{DefaultClassifier, ErrorClass, ErrorClassifier};
pub use control::{ControlSignal, RunControl};
pub use engine::{SyncEngine, SyncOptions};
pub use executor::{ChunkExecutor, RunOutcome};
pub use retry::{ResumePlan, build_resume_queue, plan_resume};
pub use snapshot::{JobSnapshot, SyncObserver};
pub use state_machine::{JobStateMachine, TransitionError};
pub use timing::{cooldown_elapsed, cooldown_elapsed_at, last_completed_at};

use crate::models::{JobId, SyncType};
use crate::plan::PlanError;

/// Errors returned by the sync engine API
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("a {sync_type} sync is already running for device {device_id}")]
    AlreadyRunning {
        device_id: String,
        sync_type: SyncType,
    },

    #[error("sync job not found: {0}")]
    JobNotFound(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
