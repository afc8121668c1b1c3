//! Window planning and chunk scheduling
//!
//! Pure functions: no storage, no network, and `now` is always injected so
//! plans are reproducible.

mod chunks;
mod window;

pub use chunks::{chunk_count, dates_in_range, schedule_chunks};
pub use window::{SyncDuration, SyncWindow, plan_window};

/// Errors produced while planning a sync
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("chunk size must be at least one day")]
    InvalidChunkSize,

    #[error("unknown sync duration: {0:?}")]
    UnknownDuration(String),
}
