use crate::data::{DataType, Granularity, RecordError, Value};
use crate::query::{self, BucketCount, KeySummary};
use crate::scheduler::{FlushOutcome, FlushStats, FlushWorker, Flusher, DEFAULT_FLUSH_INTERVAL};
use crate::storage::persistence::{restore, FileBackend, LoadOutcome, PersistenceBackend, PersistenceError};
use crate::storage::Registry;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Snapshot file
    pub path: PathBuf,
    /// Delay between dirty checks of the flush worker (default: 10 seconds)
    pub flush_interval: Duration,
}

impl RecorderConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

/// Embedded event recorder.
///
/// Events go into an in-memory [`Registry`]; a background worker writes the
/// whole registry to the snapshot file whenever it has unsaved changes. A
/// snapshot is consistent per key only: a flush racing with writers may
/// capture one key before and another after a concurrent update.
pub struct Recorder {
    registry: Arc<Registry>,
    flusher: Arc<Flusher>,
    worker: FlushWorker,
    load_outcome: LoadOutcome,
}

/// Point-in-time recorder statistics
#[derive(Debug, Clone, Serialize)]
pub struct RecorderStats {
    pub keys: usize,
    pub events: usize,
    pub dirty: bool,
    pub load: LoadOutcome,
    pub flush: FlushStats,
}

impl Recorder {
    /// Load the snapshot at `config.path` (if any) and start the flush worker.
    ///
    /// A corrupt or unreadable snapshot does not fail the open; the recorder
    /// starts empty and [`Recorder::load_outcome`] reports why. Must be called
    /// from within a tokio runtime.
    pub fn open(config: RecorderConfig) -> Result<Self, PersistenceError> {
        let backend = FileBackend::new(&config.path)?;
        Ok(Self::open_with_backend(Arc::new(backend), config.flush_interval))
    }

    /// Same as [`Recorder::open`] with a custom storage backend
    pub fn open_with_backend(backend: Arc<dyn PersistenceBackend>, flush_interval: Duration) -> Self {
        let (registry, load_outcome) = restore(backend.as_ref());
        let registry = Arc::new(registry);

        let flusher = Arc::new(Flusher::new(Arc::clone(&registry), backend));
        let worker = FlushWorker::new(Arc::clone(&flusher), flush_interval);
        worker.start();

        Self {
            registry,
            flusher,
            worker,
            load_outcome,
        }
    }

    /// Record one event; the value's type must match the key's bound type
    pub fn record_event(&self, key: &str, timestamp: i64, value: Value) -> Result<(), RecordError> {
        self.registry.record(key, timestamp, value)
    }

    /// Bind `key` to `data_type` ahead of the first event
    pub fn register_kind(&self, key: &str, data_type: DataType) -> Result<(), RecordError> {
        self.registry.register_kind(key, data_type)
    }

    pub fn total_count(&self, key: &str) -> u64 {
        query::total_count(&self.registry, key)
    }

    pub fn bucket_count(&self, key: &str, granularity: Granularity, instant: i64) -> u64 {
        query::bucket_count(&self.registry, key, granularity, instant)
    }

    /// Visit the events of `key` in order; see [`query::iterate`] for the
    /// locking rule on the visitor.
    pub fn iterate<F>(&self, key: &str, visitor: F)
    where
        F: FnMut(DateTime<Local>, &Value),
    {
        query::iterate(&self.registry, key, visitor)
    }

    pub fn bucket_counts(&self, key: &str, granularity: Granularity) -> Vec<BucketCount> {
        query::bucket_counts(&self.registry, key, granularity)
    }

    pub fn keys(&self) -> Vec<KeySummary> {
        query::key_summaries(&self.registry)
    }

    pub fn data_type(&self, key: &str) -> Option<DataType> {
        self.registry.get(key).map(|s| s.data_type())
    }

    pub fn is_dirty(&self) -> bool {
        self.registry.is_dirty()
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Flush synchronously on the calling thread
    pub fn flush_now(&self) -> Result<FlushOutcome, PersistenceError> {
        self.flusher.flush()
    }

    /// Stop the background worker; pending changes stay in memory
    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn stats(&self) -> RecorderStats {
        RecorderStats {
            keys: self.registry.len(),
            events: self.registry.event_count(),
            dirty: self.registry.is_dirty(),
            load: self.load_outcome.clone(),
            flush: self.flusher.stats(),
        }
    }
}
