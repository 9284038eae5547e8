use crate::storage::persistence::{write_snapshot, PersistenceBackend, PersistenceError};
use crate::storage::Registry;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Result of a single flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing changed since the last successful flush
    Clean,
    /// A full snapshot was written
    Written { bytes: usize },
}

/// Writes registry snapshots to a backend, one flush at a time
pub struct Flusher {
    registry: Arc<Registry>,
    backend: Arc<dyn PersistenceBackend>,
    /// Held for the whole encode + write so flushes never interleave
    in_flight: Mutex<()>,
    flushes: AtomicU64,
    failures: AtomicU64,
    last_flush_at: AtomicI64,
    last_error: Mutex<Option<String>>,
}

/// Counters describing flush history
#[derive(Debug, Clone, Serialize)]
pub struct FlushStats {
    pub flushes: u64,
    pub failures: u64,
    /// Unix seconds of the last successful flush
    pub last_flush_at: Option<i64>,
    pub last_error: Option<String>,
}

impl Flusher {
    pub fn new(registry: Arc<Registry>, backend: Arc<dyn PersistenceBackend>) -> Self {
        Self {
            registry,
            backend,
            in_flight: Mutex::new(()),
            flushes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_flush_at: AtomicI64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.registry.is_dirty()
    }

    /// Write a snapshot if the registry is dirty.
    ///
    /// The dirty flag is only cleared up to the mutation generation observed
    /// before encoding, so records racing with the flush keep it set. On
    /// failure nothing is cleared and the next flush retries from scratch.
    pub fn flush(&self) -> Result<FlushOutcome, PersistenceError> {
        let _guard = self.in_flight.lock();

        if !self.registry.is_dirty() {
            return Ok(FlushOutcome::Clean);
        }

        let generation = self.registry.generation();
        match write_snapshot(&self.registry, self.backend.as_ref()) {
            Ok(bytes) => {
                self.flushes.fetch_add(1, Ordering::SeqCst);
                self.last_flush_at
                    .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
                *self.last_error.lock() = None;
                self.registry.mark_persisted(generation);
                Ok(FlushOutcome::Written { bytes })
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                *self.last_error.lock() = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn stats(&self) -> FlushStats {
        let last = self.last_flush_at.load(Ordering::SeqCst);
        FlushStats {
            flushes: self.flushes.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            last_flush_at: (last != 0).then_some(last),
            last_error: self.last_error.lock().clone(),
        }
    }
}
