//! Chunk model: one bounded date sub-range of a sync job

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Inclusive range of calendar dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Number of calendar days covered, 0 when `end` precedes `start`
    pub fn days(&self) -> u32 {
        let span = (self.end - self.start).num_days() + 1;
        u32::try_from(span.max(0)).unwrap_or(u32::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Human label shown while the chunk is in flight
    pub fn label(&self) -> String {
        if self.start == self.end {
            self.start.format("%Y-%m-%d").to_string()
        } else {
            format!(
                "{} to {}",
                self.start.format("%Y-%m-%d"),
                self.end.format("%Y-%m-%d")
            )
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Processing status of a single chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::InProgress => "in_progress",
            ChunkStatus::Succeeded => "succeeded",
            ChunkStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChunkStatus::Pending),
            "in_progress" => Ok(ChunkStatus::InProgress),
            "succeeded" => Ok(ChunkStatus::Succeeded),
            "failed" => Ok(ChunkStatus::Failed),
            other => Err(UnknownVariant::new("chunk status", other)),
        }
    }
}

/// One bounded date sub-range of a sync window
///
/// `index` is the chunk's identity for retry and resume bookkeeping; it is
/// assigned by the scheduler in chronological order and never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: ChunkStatus,
    /// Number of times processing of this chunk has begun
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Chunk {
    /// Create a fresh pending chunk
    pub fn new(index: usize, range: DateRange) -> Self {
        Self {
            index,
            start_date: range.start,
            end_date: range.end,
            status: ChunkStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == ChunkStatus::Succeeded
    }

    /// Only pending and failed chunks may be (re)processed
    pub fn is_eligible(&self) -> bool {
        matches!(self.status, ChunkStatus::Pending | ChunkStatus::Failed)
    }
}
