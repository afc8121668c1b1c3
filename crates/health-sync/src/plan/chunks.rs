//! Chunk scheduling: split a window into bounded date ranges

use chrono::{Days, NaiveDate};

use super::PlanError;
use crate::models::{Chunk, DateRange};

/// Split `range` into consecutive, non-overlapping chunks of `chunk_size_days`
///
/// The final chunk is truncated to fit. Indexes are 0-based in chronological
/// order. The output depends only on the inputs, so a resumed job can always
/// recompute the same boundaries.
pub fn schedule_chunks(range: DateRange, chunk_size_days: u32) -> Result<Vec<Chunk>, PlanError> {
    if chunk_size_days == 0 {
        return Err(PlanError::InvalidChunkSize);
    }

    let mut chunks = Vec::with_capacity(chunk_count(range, chunk_size_days));
    let mut cursor = range.start;

    while cursor <= range.end {
        let chunk_end = cursor
            .checked_add_days(Days::new(u64::from(chunk_size_days - 1)))
            .map_or(range.end, |end| end.min(range.end));
        chunks.push(Chunk::new(chunks.len(), DateRange::new(cursor, chunk_end)));

        match chunk_end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(chunks)
}

/// `ceil(total_days / chunk_size_days)`, 0 for an empty range or zero size
pub fn chunk_count(range: DateRange, chunk_size_days: u32) -> usize {
    if chunk_size_days == 0 {
        return 0;
    }
    range.days().div_ceil(chunk_size_days) as usize
}

/// Every calendar day in the inclusive range
pub fn dates_in_range(range: DateRange) -> Vec<NaiveDate> {
    range
        .start
        .iter_days()
        .take_while(|day| *day <= range.end)
        .collect()
}
