pub mod flush;
pub mod worker;

pub use flush::{FlushOutcome, FlushStats, Flusher};
pub use worker::{FlushWorker, DEFAULT_FLUSH_INTERVAL};
