use super::bucket::{local_bucket_start, to_local, Granularity};
use super::value::{DataType, Value};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Ordered events for one key plus its day/month/year occurrence counts
#[derive(Debug)]
pub struct EventSeries {
    name: String,
    data_type: DataType,
    data: RwLock<SeriesData>,
}

#[derive(Debug, Default)]
struct SeriesData {
    events: BTreeMap<i64, Value>,
    day: BTreeMap<i64, u64>,
    month: BTreeMap<i64, u64>,
    year: BTreeMap<i64, u64>,
}

impl SeriesData {
    fn aggregate(&self, granularity: Granularity) -> &BTreeMap<i64, u64> {
        match granularity {
            Granularity::Day => &self.day,
            Granularity::Month => &self.month,
            Granularity::Year => &self.year,
        }
    }
}

impl EventSeries {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            data: RwLock::new(SeriesData::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Store `value` at `timestamp` and bump the three bucket counters.
    ///
    /// An existing value at the same timestamp is replaced, but the counters
    /// are still incremented, so re-adding a timestamp inflates every
    /// aggregate by one while `len()` stays put.
    pub fn add(&self, timestamp: i64, value: Value) -> Result<(), RecordError> {
        if value.data_type() != self.data_type {
            return Err(RecordError::TypeMismatch {
                key: self.name.clone(),
                expected: self.data_type,
                actual: value.data_type(),
            });
        }

        let invalid = || RecordError::InvalidTimestamp(timestamp);
        let day = local_bucket_start(timestamp, Granularity::Day).ok_or_else(invalid)?;
        let month = local_bucket_start(timestamp, Granularity::Month).ok_or_else(invalid)?;
        let year = local_bucket_start(timestamp, Granularity::Year).ok_or_else(invalid)?;

        let mut data = self.data.write();
        data.events.insert(timestamp, value);
        *data.day.entry(day).or_insert(0) += 1;
        *data.month.entry(month).or_insert(0) += 1;
        *data.year.entry(year).or_insert(0) += 1;

        Ok(())
    }

    /// Number of distinct timestamps stored
    pub fn len(&self) -> usize {
        self.data.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().events.is_empty()
    }

    /// Count for the bucket that starts at `bucket_start`
    pub fn bucket_count(&self, granularity: Granularity, bucket_start: i64) -> u64 {
        self.data
            .read()
            .aggregate(granularity)
            .get(&bucket_start)
            .copied()
            .unwrap_or(0)
    }

    /// All buckets of one granularity, ascending by bucket start
    pub fn bucket_counts(&self, granularity: Granularity) -> Vec<(i64, u64)> {
        self.data
            .read()
            .aggregate(granularity)
            .iter()
            .map(|(start, count)| (*start, *count))
            .collect()
    }

    /// Visit every entry in ascending timestamp order with local wall time.
    ///
    /// The series read lock is held for the whole traversal. The visitor
    /// must not record into this series or read it again; either can
    /// deadlock behind a waiting writer.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(DateTime<Local>, &Value),
    {
        let data = self.data.read();
        for (timestamp, value) in data.events.iter() {
            // Stored timestamps were validated on insert.
            if let Some(local) = to_local(*timestamp) {
                visitor(local, value);
            }
        }
    }

    /// Run `f` over the raw ordered events under the read lock
    pub fn with_events<R>(&self, f: impl FnOnce(&BTreeMap<i64, Value>) -> R) -> R {
        let data = self.data.read();
        f(&data.events)
    }

    /// Earliest and latest stored timestamps
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let data = self.data.read();
        let first = data.events.keys().next()?;
        let last = data.events.keys().next_back()?;
        Some((*first, *last))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("key '{key}' holds {expected} values, got {actual}")]
    TypeMismatch {
        key: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("timestamp {0} is outside the supported calendar range")]
    InvalidTimestamp(i64),
}
