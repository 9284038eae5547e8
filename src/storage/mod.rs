pub mod codec;
pub mod persistence;
pub mod registry;

pub use codec::{decode, encode, CodecError};
pub use persistence::{FileBackend, LoadOutcome, PersistenceBackend, PersistenceError};
pub use registry::Registry;
