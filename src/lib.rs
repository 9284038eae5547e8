//! Tally: Embedded Event Recorder
//!
//! Records typed, timestamped events under string keys, keeps running
//! per-day/month/year occurrence counts for dashboard queries, and persists
//! everything to a compact binary snapshot through a debounced background
//! writer.
//!
//! # Features
//!
//! - **Typed Values**: a closed set of primitive kinds, fixed per key
//! - **Local-Time Buckets**: day/month/year counts in server-local time
//! - **Two-Tier Locking**: a registry lock for lookups, one lock per key for data
//! - **Binary Snapshots**: length-prefixed little-endian format, rebuilt on load
//! - **Debounced Flushing**: a single worker writes only when there are changes
//!
//! # Example
//!
//! ```no_run
//! use tally::{Granularity, Recorder, RecorderConfig, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let recorder = Recorder::open(RecorderConfig::new("./tally_data/events.bin"))?;
//!
//! recorder.record_event("login", 1_700_000_000, Value::I32(1))?;
//! recorder.record_event("login", 1_700_086_400, Value::I32(1))?;
//!
//! assert_eq!(recorder.total_count("login"), 2);
//! println!("today: {}", recorder.bucket_count("login", Granularity::Day, 1_700_086_400));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod data;
pub mod query;
pub mod recorder;
pub mod scheduler;
pub mod storage;

// Re-export commonly used types
pub use data::{DataType, Decimal, EventSeries, Granularity, RecordError, Value};
pub use recorder::{Recorder, RecorderConfig, RecorderStats};
pub use storage::{CodecError, LoadOutcome, PersistenceError, Registry};
