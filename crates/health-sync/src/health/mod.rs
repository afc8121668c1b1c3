//! Health-platform and server collaborators
//!
//! This module provides:
//! - The reader trait for the on-device health platform (HealthKit, Health Connect)
//! - The upload trait for the self-hosted server, plus a REST implementation
//! - Record types and the transform from platform records to upload batches

mod http;
mod records;
pub mod transform;

pub use http::HttpUploadClient;
pub use records::{ActivityRecord, HealthRecord, UploadActivity, UploadBatch, UploadMetric};

use crate::models::{DateRange, MetricType};

/// Failure reported by a collaborator while processing a chunk
///
/// Whether a failure is chunk-scoped or aborts the job is decided by an
/// [`crate::sync::ErrorClassifier`], not here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("rate limited by server")]
    RateLimited,

    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid data: {0}")]
    Validation(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Read access to the on-device health platform
pub trait HealthReader: Send + Sync {
    /// Daily metrics recorded within `range`
    fn read_health(
        &self,
        range: &DateRange,
        metrics: &[MetricType],
    ) -> Result<Vec<HealthRecord>, ChunkError>;

    /// Activities that started within `range`
    fn read_activities(&self, range: &DateRange) -> Result<Vec<ActivityRecord>, ChunkError>;
}

/// Write access to the self-hosted server
pub trait UploadClient: Send + Sync {
    /// Whether the server already holds data for the whole range
    fn has_data(&self, device_id: &str, range: &DateRange) -> Result<bool, ChunkError>;

    /// Upload one chunk's worth of records
    ///
    /// The batch carries an idempotency key; servers must treat a repeated
    /// key as a no-op so a retried chunk cannot duplicate records.
    fn upload(&self, batch: &UploadBatch) -> Result<(), ChunkError>;
}
