//! Restoring and writing whole-registry snapshots

use super::{PersistenceBackend, PersistenceError};
use crate::storage::codec;
use crate::storage::Registry;
use serde::Serialize;

/// What happened when the stored snapshot was loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// No snapshot existed yet
    Missing,
    /// Snapshot decoded completely
    Restored { collections: usize, events: usize },
    /// Snapshot was unreadable or corrupt and has been ignored
    Discarded { reason: String },
}

impl LoadOutcome {
    pub fn is_discarded(&self) -> bool {
        matches!(self, LoadOutcome::Discarded { .. })
    }
}

/// Load the stored snapshot.
///
/// Never fails: a snapshot that cannot be read or decoded is dropped in
/// favour of an empty registry, and the reason is reported in the outcome.
pub fn restore(backend: &dyn PersistenceBackend) -> (Registry, LoadOutcome) {
    let data = match backend.read() {
        Ok(Some(data)) => data,
        Ok(None) => {
            tracing::info!("No snapshot at {}, starting empty", backend.describe());
            return (Registry::new(), LoadOutcome::Missing);
        }
        Err(e) => return discard(backend, e),
    };

    match codec::decode(&data) {
        Ok(registry) => {
            let outcome = LoadOutcome::Restored {
                collections: registry.len(),
                events: registry.event_count(),
            };
            tracing::info!(
                "Restored {} keys ({} bytes) from {}",
                registry.len(),
                data.len(),
                backend.describe()
            );
            (registry, outcome)
        }
        Err(e) => discard(backend, PersistenceError::Codec(e)),
    }
}

fn discard(backend: &dyn PersistenceBackend, error: PersistenceError) -> (Registry, LoadOutcome) {
    tracing::warn!(
        "Discarding snapshot at {}: {}; starting empty",
        backend.describe(),
        error
    );
    let outcome = LoadOutcome::Discarded {
        reason: error.to_string(),
    };
    (Registry::new(), outcome)
}

/// Encode `registry` and overwrite the stored snapshot, returning bytes written
pub fn write_snapshot(
    registry: &Registry,
    backend: &dyn PersistenceBackend,
) -> Result<usize, PersistenceError> {
    let data = codec::encode(registry)?;
    backend.write(&data)?;
    Ok(data.len())
}
