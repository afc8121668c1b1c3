//! Chunk error classification

use crate::health::ChunkError;

/// How far a chunk failure reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Recorded against the chunk; the run continues with the next chunk
    Transient,
    /// Stops the run and fails the job
    Fatal,
}

/// Decides whether a chunk failure is transient or fatal
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, error: &ChunkError) -> ErrorClass;
}

/// Network trouble, server faults, timeouts and throttling are transient.
/// Everything that a retry cannot fix is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultClassifier;

impl ErrorClassifier for DefaultClassifier {
    fn classify(&self, error: &ChunkError) -> ErrorClass {
        match error {
            ChunkError::Network(_) | ChunkError::Timeout | ChunkError::RateLimited => {
                ErrorClass::Transient
            }
            ChunkError::Server { status, .. } if *status >= 500 => ErrorClass::Transient,
            ChunkError::Server { .. }
            | ChunkError::Unauthorized(_)
            | ChunkError::PermissionDenied(_)
            | ChunkError::Validation(_)
            | ChunkError::MalformedResponse(_) => ErrorClass::Fatal,
        }
    }
}
