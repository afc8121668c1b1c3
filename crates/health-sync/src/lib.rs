//! Health-sync crate - chunked, resumable import of on-device health data
//!
//! This crate provides the sync job engine behind the mobile client's
//! health import, including:
//! - Domain models (SyncJob, Chunk, Stage, MetricType)
//! - Window planning and chunk scheduling
//! - Stage-weighted progress estimation
//! - Job state machine, chunk executor and resume planning
//! - Storage trait abstractions with in-memory and SQLite backends
//! - Record cleaning, unit conversion and a REST upload client
//! - UniFFI facade for Swift/Kotlin hosts
//!
//! The health platform itself is reached through [`HealthReader`], so the
//! engine has no platform SDK dependencies.

uniffi::setup_scaffolding!();

pub mod ffi;
pub mod health;
pub mod models;
pub mod plan;
pub mod progress;
pub mod settings;
pub mod storage;
pub mod sync;

pub use health::{
    ActivityRecord, ChunkError, HealthReader, HealthRecord, HttpUploadClient, UploadActivity,
    UploadBatch, UploadClient, UploadMetric,
};
pub use models::{
    Chunk, ChunkStatus, DateRange, FailedChunk, JobId, JobStatus, MetricType, Stage, SyncJob,
    SyncType,
};
pub use plan::{PlanError, SyncDuration, SyncWindow, chunk_count, dates_in_range, plan_window, schedule_chunks};
pub use progress::{job_percent, progress_percent, stage_weight, weight_for_label};
pub use settings::SyncSettings;
pub use storage::{InMemoryJobStore, JobStore, SqliteJobStore};
pub use sync::{
    // Engine control surface
    JobSnapshot, SyncEngine, SyncError, SyncObserver, SyncOptions,
    // Building blocks, for hosts that drive jobs themselves
    ChunkExecutor, ControlSignal, DefaultClassifier, ErrorClass, ErrorClassifier,
    JobStateMachine, ResumePlan, RunControl, RunOutcome, TransitionError,
    build_resume_queue, plan_resume,
    // Sync timing (for incremental cadence)
    cooldown_elapsed,
};
