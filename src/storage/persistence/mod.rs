//! Persistence of the registry snapshot
//!
//! The whole registry lives in one file that is overwritten on every flush.

pub mod file;
pub mod snapshot;

pub use file::FileBackend;
pub use snapshot::{restore, write_snapshot, LoadOutcome};

use super::codec::CodecError;

/// Trait for snapshot storage backends
pub trait PersistenceBackend: Send + Sync {
    /// Replace the stored snapshot with `data`
    fn write(&self, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read the stored snapshot, `None` if nothing has been written yet
    fn read(&self) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}
