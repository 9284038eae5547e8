//! Calendar bucketing in server-local time
//!
//! A bucket start is found by moving the UTC instant into the local zone,
//! truncating the wall clock to the start of its day, month or year, and
//! mapping that wall clock back to a Unix timestamp. Two instants that are
//! simultaneous in UTC can therefore land in different buckets on hosts in
//! different zones.

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDate, Offset, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar granularity of a pre-aggregated bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::Day, Granularity::Month, Granularity::Year];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Month => "month",
            Granularity::Year => "year",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown granularity '{0}', expected day, month or year")]
pub struct ParseGranularityError(String);

impl FromStr for Granularity {
    type Err = ParseGranularityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            _ => Err(ParseGranularityError(s.to_string())),
        }
    }
}

/// Bucket start of `timestamp` in the server's local zone
pub fn local_bucket_start(timestamp: i64, granularity: Granularity) -> Option<i64> {
    bucket_start_in(timestamp, granularity, &Local)
}

/// Bucket start of `timestamp` in an arbitrary zone.
///
/// Returns `None` when the timestamp, or its bucket start, has no calendar
/// representation in `tz`.
pub fn bucket_start_in<Tz: TimeZone>(
    timestamp: i64,
    granularity: Granularity,
    tz: &Tz,
) -> Option<i64> {
    let utc = DateTime::from_timestamp(timestamp, 0)?.naive_utc();
    let event_offset = tz.offset_from_utc_datetime(&utc).fix();
    // Near the ends of the calendar range the local wall clock can overflow.
    let date = utc.checked_add_offset(event_offset)?.date();

    let start_date = match granularity {
        Granularity::Day => date,
        Granularity::Month => date.with_day(1)?,
        Granularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?,
    };
    let wall_start = start_date.and_hms_opt(0, 0, 0)?;

    let start = match tz.offset_from_local_datetime(&wall_start) {
        LocalResult::Single(offset) => wall_start.checked_sub_offset(offset.fix())?,
        // Midnight repeats after clocks go back: take the earlier instant
        LocalResult::Ambiguous(a, b) => {
            let a = wall_start.checked_sub_offset(a.fix())?;
            let b = wall_start.checked_sub_offset(b.fix())?;
            a.min(b)
        }
        // Midnight skipped by a forward jump: use the event's own offset
        LocalResult::None => wall_start.checked_sub_offset(event_offset)?,
    };
    Some(start.and_utc().timestamp())
}

/// Convert a stored timestamp to local wall-clock time
pub fn to_local(timestamp: i64) -> Option<DateTime<Local>> {
    Local.timestamp_opt(timestamp, 0).single()
}
