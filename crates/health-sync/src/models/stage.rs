//! Pipeline stages of a single chunk

use std::fmt;

use serde::{Deserialize, Serialize};

/// Step of the per-chunk pipeline currently executing
///
/// Each stage carries a fixed weight: the fraction of the chunk considered
/// done once the stage has been entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Checking,
    Starting,
    FetchingHealth,
    ProcessingHealth,
    FetchingActivities,
    Uploading,
    Skipped,
    Complete,
}

impl Stage {
    /// All stages in pipeline order
    pub const ALL: [Stage; 8] = [
        Stage::Checking,
        Stage::Starting,
        Stage::FetchingHealth,
        Stage::ProcessingHealth,
        Stage::FetchingActivities,
        Stage::Uploading,
        Stage::Skipped,
        Stage::Complete,
    ];

    /// Label shown to the user while the stage runs
    pub fn label(self) -> &'static str {
        match self {
            Stage::Checking => "Checking existing data...",
            Stage::Starting => "Starting chunk...",
            Stage::FetchingHealth => "Fetching health data...",
            Stage::ProcessingHealth => "Processing health data...",
            Stage::FetchingActivities => "Fetching activities...",
            Stage::Uploading => "Processing and uploading activities...",
            Stage::Skipped => "Skipped (data exists)",
            Stage::Complete => "Chunk complete",
        }
    }

    /// Completion within the current chunk, in `[0, 1]`
    pub fn weight(self) -> f64 {
        match self {
            Stage::Checking => 0.05,
            Stage::Starting => 0.10,
            Stage::FetchingHealth => 0.20,
            Stage::ProcessingHealth => 0.40,
            Stage::FetchingActivities => 0.60,
            Stage::Uploading => 0.80,
            Stage::Skipped | Stage::Complete => 1.0,
        }
    }

    /// Exact label lookup
    pub fn from_label(label: &str) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| s.label() == label)
    }

    /// Whether the chunk is finished once this stage is reached
    pub fn is_final(self) -> bool {
        matches!(self, Stage::Skipped | Stage::Complete)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
