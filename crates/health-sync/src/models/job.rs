//! Sync job model: one historical or incremental import run

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use super::{Chunk, ChunkStatus, Stage, UnknownVariant};

/// Opaque identifier of a sync job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of import a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncType {
    /// Backfill of a past date window
    Historical,
    /// Short catch-up window since the last completed sync
    Incremental,
}

impl SyncType {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncType::Historical => "historical",
            SyncType::Incremental => "incremental",
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "historical" => Ok(SyncType::Historical),
            "incremental" => Ok(SyncType::Incremental),
            other => Err(UnknownVariant::new("sync type", other)),
        }
    }
}

/// Lifecycle status of a sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Failed,
    Completed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Failed => "failed",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// No transition leaves a terminal status
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Paused)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Paused, Running)
                | (Paused, Cancelled)
                | (Failed, Running)
                | (Failed, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "failed" => Ok(JobStatus::Failed),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(UnknownVariant::new("job status", other)),
        }
    }
}

/// Bookkeeping entry for a chunk whose last attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedChunk {
    pub chunk_index: usize,
    pub attempts: u32,
    pub last_error: String,
}

/// One run of importing a date window, composed of ordered chunks
///
/// Mutate through [`crate::sync::JobStateMachine`] so transitions are
/// validated and every step is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: JobId,
    /// Device that owns the import; at most one running job per device and type
    pub device_id: String,
    pub sync_type: SyncType,
    pub status: JobStatus,
    /// Planned window start, local midnight with its UTC offset
    pub start_date: DateTime<FixedOffset>,
    pub end_date: DateTime<FixedOffset>,
    pub chunk_size_days: u32,
    pub chunks_total: usize,
    /// Count of chunks with status `succeeded`
    pub chunks_completed: usize,
    pub current_chunk_index: Option<usize>,
    pub current_chunk_range: Option<String>,
    /// Only set while `status` is `running`
    pub current_stage: Option<Stage>,
    /// Ordered by chunk index
    pub failed_chunks: Vec<FailedChunk>,
    /// Only set on fatal failure
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chunks: Vec<Chunk>,
}

impl SyncJob {
    /// Create a pending job over the given window and chunk plan
    pub fn new(
        device_id: impl Into<String>,
        sync_type: SyncType,
        start_date: DateTime<FixedOffset>,
        end_date: DateTime<FixedOffset>,
        chunk_size_days: u32,
        chunks: Vec<Chunk>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            device_id: device_id.into(),
            sync_type,
            status: JobStatus::Pending,
            start_date,
            end_date,
            chunk_size_days,
            chunks_total: chunks.len(),
            chunks_completed: 0,
            current_chunk_index: None,
            current_chunk_range: None,
            current_stage: None,
            failed_chunks: Vec::new(),
            error_message: None,
            created_at: now,
            updated_at: now,
            chunks,
        }
    }

    pub fn chunk(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    /// Highest index among succeeded chunks
    pub fn last_succeeded_index(&self) -> Option<usize> {
        self.chunks
            .iter()
            .filter(|c| c.is_succeeded())
            .map(|c| c.index)
            .max()
    }

    /// Re-derive `chunks_completed` from persisted chunk state
    pub fn recount(&mut self) {
        self.chunks_total = self.chunks.len();
        self.chunks_completed = self.chunks.iter().filter(|c| c.is_succeeded()).count();
    }

    pub fn chunks_with_status(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// True when every chunk succeeded and nothing awaits retry
    pub fn is_fully_synced(&self) -> bool {
        self.chunks_completed == self.chunks_total && self.failed_chunks.is_empty()
    }
}
