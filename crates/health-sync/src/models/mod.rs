//! Domain models for sync jobs

mod chunk;
mod job;
mod metric;
mod stage;

pub use chunk::{Chunk, ChunkStatus, DateRange};
pub use job::{FailedChunk, JobId, JobStatus, SyncJob, SyncType};
pub use metric::MetricType;
pub use stage::Stage;

/// A persisted or foreign string did not match any known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
