//! Read-side queries over a [`Registry`]
//!
//! Unknown keys are not errors: counts come back as zero and iteration visits
//! nothing. None of these functions mutate state.

use crate::data::{local_bucket_start, DataType, Granularity, Value};
use crate::storage::Registry;
use chrono::{DateTime, Local};
use serde::Serialize;

/// Number of distinct timestamps recorded for `key`
pub fn total_count(registry: &Registry, key: &str) -> u64 {
    registry.get(key).map(|s| s.len() as u64).unwrap_or(0)
}

/// Occurrences in the local `granularity` bucket containing `instant`
pub fn bucket_count(registry: &Registry, key: &str, granularity: Granularity, instant: i64) -> u64 {
    let Some(series) = registry.get(key) else {
        return 0;
    };
    match local_bucket_start(instant, granularity) {
        Some(start) => series.bucket_count(granularity, start),
        None => 0,
    }
}

/// Visit every event of `key` in ascending timestamp order.
///
/// Runs under the series read lock. The visitor may touch other keys but
/// must not record into or re-read `key`.
pub fn iterate<F>(registry: &Registry, key: &str, visitor: F)
where
    F: FnMut(DateTime<Local>, &Value),
{
    if let Some(series) = registry.get(key) {
        series.for_each(visitor);
    }
}

/// One pre-aggregated bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    /// Unix seconds of the local bucket start
    pub start: i64,
    pub count: u64,
}

/// Every bucket of `key` at `granularity`, ascending by start
pub fn bucket_counts(registry: &Registry, key: &str, granularity: Granularity) -> Vec<BucketCount> {
    registry
        .get(key)
        .map(|series| {
            series
                .bucket_counts(granularity)
                .into_iter()
                .map(|(start, count)| BucketCount { start, count })
                .collect()
        })
        .unwrap_or_default()
}

/// Summary of one key for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeySummary {
    pub name: String,
    pub data_type: DataType,
    pub events: u64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}

/// Summaries of every key in creation order
pub fn key_summaries(registry: &Registry) -> Vec<KeySummary> {
    registry
        .snapshot()
        .iter()
        .map(|series| {
            let range = series.time_range();
            KeySummary {
                name: series.name().to_string(),
                data_type: series.data_type(),
                events: series.len() as u64,
                first_timestamp: range.map(|(first, _)| first),
                last_timestamp: range.map(|(_, last)| last),
            }
        })
        .collect()
}
