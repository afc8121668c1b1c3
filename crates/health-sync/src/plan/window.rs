//! Sync window planning

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use serde::{Deserialize, Serialize};

use super::PlanError;
use crate::models::DateRange;

/// How far back an import reaches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDuration {
    #[serde(rename = "today")]
    Today,
    #[serde(rename = "24h")]
    Hours24,
    #[serde(rename = "3d")]
    Days3,
    #[serde(rename = "7d")]
    Days7,
    #[serde(rename = "30d")]
    Days30,
    #[serde(rename = "90d")]
    Days90,
    #[serde(rename = "180d")]
    Days180,
    #[serde(rename = "365d")]
    Days365,
}

impl SyncDuration {
    pub const ALL: [SyncDuration; 8] = [
        SyncDuration::Today,
        SyncDuration::Hours24,
        SyncDuration::Days3,
        SyncDuration::Days7,
        SyncDuration::Days30,
        SyncDuration::Days90,
        SyncDuration::Days180,
        SyncDuration::Days365,
    ];

    /// Number of calendar days covered, today included
    ///
    /// `24h` spans two calendar days so the window still covers the full
    /// previous 24 hours once its start is snapped back to midnight.
    pub fn window_days(self) -> u32 {
        match self {
            SyncDuration::Today => 1,
            SyncDuration::Hours24 => 2,
            SyncDuration::Days3 => 3,
            SyncDuration::Days7 => 7,
            SyncDuration::Days30 => 30,
            SyncDuration::Days90 => 90,
            SyncDuration::Days180 => 180,
            SyncDuration::Days365 => 365,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncDuration::Today => "today",
            SyncDuration::Hours24 => "24h",
            SyncDuration::Days3 => "3d",
            SyncDuration::Days7 => "7d",
            SyncDuration::Days30 => "30d",
            SyncDuration::Days90 => "90d",
            SyncDuration::Days180 => "180d",
            SyncDuration::Days365 => "365d",
        }
    }
}

impl fmt::Display for SyncDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDuration {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncDuration::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| PlanError::UnknownDuration(s.to_string()))
    }
}

/// Concrete `[start, end]` of an import
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    /// Local midnight of the first day
    pub start: DateTime<FixedOffset>,
    /// The instant the window was planned
    pub end: DateTime<FixedOffset>,
}

impl SyncWindow {
    /// Calendar days covered, in the zone the window was planned in
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.start.date_naive(), self.end.date_naive())
    }
}

/// Turn a duration into a concrete window ending at `now`
///
/// The start is midnight, in `now`'s zone, of the day `(N - 1)` days before
/// today. The time of day at which this is called never leaks into it.
pub fn plan_window<Tz: TimeZone>(duration: SyncDuration, now: &DateTime<Tz>) -> SyncWindow {
    let tz = now.timezone();
    let today = now.date_naive();
    let back = u64::from(duration.window_days().saturating_sub(1));
    let first_day = today.checked_sub_days(Days::new(back)).unwrap_or(today);

    SyncWindow {
        start: start_of_day(&tz, first_day).fixed_offset(),
        end: now.fixed_offset(),
    }
}

/// Earliest instant of `day` in `tz`
///
/// Zones that skip midnight on a DST change get the first valid minute after it.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Tz> {
    let midnight = day.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt;
    }
    (1..=180)
        .find_map(|minutes| {
            tz.from_local_datetime(&(midnight + TimeDelta::minutes(minutes)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}
