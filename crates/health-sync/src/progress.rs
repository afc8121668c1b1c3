//! Progress estimation for sync jobs
//!
//! Progress is whole chunks done plus the weight of the stage in flight.
//! Running jobs are capped at 99% so the UI never shows 100% before the job
//! is formally marked complete.

use crate::models::{JobStatus, Stage, SyncJob};

/// Weight used for labels that match nothing we know
const NEUTRAL_WEIGHT: f64 = 0.5;

/// Highest percent reported for a job that is not `completed`
const MAX_UNFINISHED_PERCENT: u8 = 99;

/// Weight of the stage in flight, 0 when no stage has been entered yet
pub fn stage_weight(stage: Option<Stage>) -> f64 {
    stage.map_or(0.0, Stage::weight)
}

/// Resolve a free-form progress label to a weight
///
/// Host apps and older persisted jobs report progress as text. Known labels
/// map through the stage table; anything else falls back to substring rules
/// and finally to the neutral midpoint, so progress never visibly regresses.
pub fn weight_for_label(label: &str) -> f64 {
    if let Some(stage) = Stage::from_label(label) {
        return stage.weight();
    }
    if label.contains("sleep entries") {
        return 0.5;
    }
    if label.contains("Processing") && label.contains("activities...") {
        return 0.8;
    }
    NEUTRAL_WEIGHT
}

/// Overall percent for a job in the given state
pub fn progress_percent(
    status: JobStatus,
    chunks_completed: usize,
    chunks_total: usize,
    stage: Option<Stage>,
) -> u8 {
    if status == JobStatus::Completed {
        return 100;
    }
    if chunks_total == 0 {
        return 0;
    }

    let in_flight = if status == JobStatus::Running {
        stage_weight(stage)
    } else {
        0.0
    };
    let fraction = (chunks_completed as f64 + in_flight) / chunks_total as f64;
    let percent = (fraction * 100.0).round().clamp(0.0, f64::from(MAX_UNFINISHED_PERCENT));
    percent as u8
}

/// Overall percent for a job snapshot
pub fn job_percent(job: &SyncJob) -> u8 {
    progress_percent(
        job.status,
        job.chunks_completed,
        job.chunks_total,
        job.current_stage,
    )
}
