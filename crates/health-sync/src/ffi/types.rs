//! FFI-friendly type wrappers for UniFFI export
//!
//! These types convert internal Rust types to FFI-compatible versions:
//! - `DateTime<Utc>` → `i64` (Unix timestamp)
//! - `JobId` → `String`
//! - Counts → `u32`
//! - `Stage` → its display label

use crate::health::ChunkError;
use crate::models::{FailedChunk, JobStatus, SyncType};
use crate::plan::SyncDuration;
use crate::sync::{JobSnapshot, SyncError, TransitionError};

// ============================================================================
// Error Types
// ============================================================================

/// FFI-friendly error type
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiSyncError {
    #[error("Sync already running: {message}")]
    AlreadyRunning { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl From<SyncError> for FfiSyncError {
    fn from(e: SyncError) -> Self {
        let message = e.to_string();
        match e {
            SyncError::AlreadyRunning { .. } => FfiSyncError::AlreadyRunning { message },
            SyncError::JobNotFound(id) => FfiSyncError::NotFound {
                resource: format!("sync job {}", id),
            },
            SyncError::Transition(_) => FfiSyncError::InvalidState { message },
            SyncError::Plan(_) => FfiSyncError::InvalidArgument { message },
            SyncError::Internal(_) => FfiSyncError::Storage { message },
        }
    }
}

impl From<TransitionError> for FfiSyncError {
    fn from(e: TransitionError) -> Self {
        SyncError::from(e).into()
    }
}

impl From<anyhow::Error> for FfiSyncError {
    fn from(e: anyhow::Error) -> Self {
        FfiSyncError::Storage {
            message: format!("{:#}", e),
        }
    }
}

/// Error a host health reader reports back to Rust
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum FfiReadError {
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Platform unavailable: {message}")]
    Unavailable { message: String },

    #[error("Timed out")]
    Timeout,

    #[error("Reader error: {message}")]
    Other { message: String },
}

impl From<uniffi::UnexpectedUniFFICallbackError> for FfiReadError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        FfiReadError::Other { message: e.reason }
    }
}

impl From<FfiReadError> for ChunkError {
    fn from(e: FfiReadError) -> Self {
        match e {
            FfiReadError::PermissionDenied { message } => ChunkError::PermissionDenied(message),
            // A busy or locked health store usually recovers on the next attempt
            FfiReadError::Unavailable { message } => ChunkError::Network(message),
            FfiReadError::Timeout => ChunkError::Timeout,
            FfiReadError::Other { message } => ChunkError::MalformedResponse(message),
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSyncType {
    Historical,
    Incremental,
}

impl From<FfiSyncType> for SyncType {
    fn from(t: FfiSyncType) -> Self {
        match t {
            FfiSyncType::Historical => SyncType::Historical,
            FfiSyncType::Incremental => SyncType::Incremental,
        }
    }
}

impl From<SyncType> for FfiSyncType {
    fn from(t: SyncType) -> Self {
        match t {
            SyncType::Historical => FfiSyncType::Historical,
            SyncType::Incremental => FfiSyncType::Incremental,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiJobStatus {
    Pending,
    Running,
    Paused,
    Failed,
    Completed,
    Cancelled,
}

impl From<JobStatus> for FfiJobStatus {
    fn from(s: JobStatus) -> Self {
        match s {
            JobStatus::Pending => FfiJobStatus::Pending,
            JobStatus::Running => FfiJobStatus::Running,
            JobStatus::Paused => FfiJobStatus::Paused,
            JobStatus::Failed => FfiJobStatus::Failed,
            JobStatus::Completed => FfiJobStatus::Completed,
            JobStatus::Cancelled => FfiJobStatus::Cancelled,
        }
    }
}

/// Import window offered in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSyncDuration {
    Today,
    Hours24,
    Days3,
    Days7,
    Days30,
    Days90,
    Days180,
    Days365,
}

impl From<FfiSyncDuration> for SyncDuration {
    fn from(d: FfiSyncDuration) -> Self {
        match d {
            FfiSyncDuration::Today => SyncDuration::Today,
            FfiSyncDuration::Hours24 => SyncDuration::Hours24,
            FfiSyncDuration::Days3 => SyncDuration::Days3,
            FfiSyncDuration::Days7 => SyncDuration::Days7,
            FfiSyncDuration::Days30 => SyncDuration::Days30,
            FfiSyncDuration::Days90 => SyncDuration::Days90,
            FfiSyncDuration::Days180 => SyncDuration::Days180,
            FfiSyncDuration::Days365 => SyncDuration::Days365,
        }
    }
}

// ============================================================================
// Job Snapshot
// ============================================================================

#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiFailedChunk {
    pub chunk_index: u32,
    pub attempts: u32,
    pub last_error: String,
}

impl From<FailedChunk> for FfiFailedChunk {
    fn from(f: FailedChunk) -> Self {
        Self {
            chunk_index: saturating_u32(f.chunk_index),
            attempts: f.attempts,
            last_error: f.last_error,
        }
    }
}

/// FFI-friendly job snapshot for progress UI
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiJobSnapshot {
    pub job_id: String,
    pub status: FfiJobStatus,
    pub sync_type: FfiSyncType,
    pub chunks_total: u32,
    pub chunks_completed: u32,
    pub current_chunk_range: Option<String>,
    /// Label of the stage in flight, e.g. "Fetching health data..."
    pub current_stage: Option<String>,
    pub failed_chunks: Vec<FfiFailedChunk>,
    pub error_message: Option<String>,
    pub failure_summary: Option<String>,
    /// 0..=100
    pub percent: u8,
    /// Unix timestamp (seconds since epoch)
    pub updated_at: i64,
}

impl From<JobSnapshot> for FfiJobSnapshot {
    fn from(s: JobSnapshot) -> Self {
        Self {
            failure_summary: s.failure_summary(),
            current_stage: s.stage_label().map(str::to_string),
            job_id: s.job_id.0,
            status: s.status.into(),
            sync_type: s.sync_type.into(),
            chunks_total: saturating_u32(s.chunks_total),
            chunks_completed: saturating_u32(s.chunks_completed),
            current_chunk_range: s.current_chunk_range,
            failed_chunks: s.failed_chunks.into_iter().map(FfiFailedChunk::from).collect(),
            error_message: s.error_message,
            percent: s.percent,
            updated_at: s.updated_at.timestamp(),
        }
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Host-side reader for HealthKit / Health Connect
///
/// Dates are `YYYY-MM-DD`, inclusive. Both methods return a JSON array:
/// health records as `{"metric", "date", "data"}`, activities as
/// `{"activity_id", "name", "type_key", "start_time", "distance_m",
/// "duration_s", "elapsed_duration_s", "moving_duration_s", "details"}`.
#[uniffi::export(callback_interface)]
pub trait FfiHealthReader: Send + Sync {
    fn read_health(
        &self,
        start_date: String,
        end_date: String,
        metrics: Vec<String>,
    ) -> Result<String, FfiReadError>;

    fn read_activities(&self, start_date: String, end_date: String) -> Result<String, FfiReadError>;
}

/// Callback interface for job progress updates
#[uniffi::export(callback_interface)]
pub trait SyncProgressCallback: Send + Sync {
    /// Called after every persisted step of a job
    fn on_update(&self, snapshot: FfiJobSnapshot);
}

// ============================================================================
// Log Callback
// ============================================================================

/// Log level for FFI callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for FfiLogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => FfiLogLevel::Error,
            log::Level::Warn => FfiLogLevel::Warn,
            log::Level::Info => FfiLogLevel::Info,
            log::Level::Debug => FfiLogLevel::Debug,
            log::Level::Trace => FfiLogLevel::Trace,
        }
    }
}

impl From<FfiLogLevel> for log::Level {
    fn from(level: FfiLogLevel) -> Self {
        match level {
            FfiLogLevel::Error => log::Level::Error,
            FfiLogLevel::Warn => log::Level::Warn,
            FfiLogLevel::Info => log::Level::Info,
            FfiLogLevel::Debug => log::Level::Debug,
            FfiLogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Callback interface for receiving log messages from Rust
///
/// Swift should implement this using os_log/Logger, Kotlin using Logcat.
#[uniffi::export(callback_interface)]
pub trait LogCallback: Send + Sync {
    /// Called when a log message is emitted
    ///
    /// # Arguments
    /// * `level` - The log level (error, warn, info, debug, trace)
    /// * `target` - The logging target (typically module path, e.g., "health_sync::sync")
    /// * `message` - The log message
    fn on_log(&self, level: FfiLogLevel, target: String, message: String);
}
