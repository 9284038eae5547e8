use crate::data::{DataType, EventSeries, RecordError, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owns every [`EventSeries`], keyed by name and kept in creation order.
///
/// The registry lock only guards the map itself; event data lives behind each
/// series' own lock so writers to different keys never contend here for more
/// than a lookup.
#[derive(Debug, Default)]
pub struct Registry {
    collections: RwLock<Collections>,
    /// Bumped on every successful record
    mutations: AtomicU64,
    /// Mutation generation covered by the last successful flush
    persisted: AtomicU64,
}

#[derive(Debug, Default)]
struct Collections {
    index: HashMap<String, usize>,
    series: Vec<Arc<EventSeries>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the series for `key`, creating it with `data_type` if absent.
    ///
    /// The type only applies on creation; an existing series keeps its own.
    pub fn resolve(&self, key: &str, data_type: DataType) -> Arc<EventSeries> {
        // Fast path under the read lock
        {
            let collections = self.collections.read();
            if let Some(&idx) = collections.index.get(key) {
                return Arc::clone(&collections.series[idx]);
            }
        }

        let mut collections = self.collections.write();

        // Double-check in case another thread created it
        if let Some(&idx) = collections.index.get(key) {
            return Arc::clone(&collections.series[idx]);
        }

        let series = Arc::new(EventSeries::new(key, data_type));
        let idx = collections.series.len();
        collections.series.push(Arc::clone(&series));
        collections.index.insert(key.to_string(), idx);

        tracing::debug!("Created series '{}' of type {}", key, data_type);
        series
    }

    /// Get an existing series
    pub fn get(&self, key: &str) -> Option<Arc<EventSeries>> {
        let collections = self.collections.read();
        collections
            .index
            .get(key)
            .map(|&idx| Arc::clone(&collections.series[idx]))
    }

    /// Bind `key` to `data_type`, or confirm the existing binding
    pub fn register_kind(&self, key: &str, data_type: DataType) -> Result<(), RecordError> {
        let series = self.resolve(key, data_type);
        if series.data_type() != data_type {
            return Err(RecordError::TypeMismatch {
                key: key.to_string(),
                expected: series.data_type(),
                actual: data_type,
            });
        }
        Ok(())
    }

    /// Record one event and mark the registry dirty
    pub fn record(&self, key: &str, timestamp: i64, value: Value) -> Result<(), RecordError> {
        let series = self.resolve(key, value.data_type());
        series.add(timestamp, value)?;
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// All series in creation order.
    ///
    /// The list is a point-in-time copy of the map; each series may keep
    /// changing afterwards, so a caller walking it sees per-series, not
    /// registry-wide, consistency.
    pub fn snapshot(&self) -> Vec<Arc<EventSeries>> {
        self.collections.read().series.clone()
    }

    /// Key names in creation order
    pub fn keys(&self) -> Vec<String> {
        self.collections
            .read()
            .series
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.collections.read().series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total events across all series
    pub fn event_count(&self) -> usize {
        self.snapshot().iter().map(|s| s.len()).sum()
    }

    /// Whether mutations exist that no successful flush has covered
    pub fn is_dirty(&self) -> bool {
        self.mutations.load(Ordering::SeqCst) != self.persisted.load(Ordering::SeqCst)
    }

    /// Current mutation generation, captured by a flush before encoding
    pub fn generation(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Mark everything up to `generation` as persisted
    pub fn mark_persisted(&self, generation: u64) {
        self.persisted.fetch_max(generation, Ordering::SeqCst);
    }
}
