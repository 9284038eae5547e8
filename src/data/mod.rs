pub mod bucket;
pub mod series;
pub mod value;

pub use bucket::{bucket_start_in, local_bucket_start, Granularity, ParseGranularityError};
pub use series::{EventSeries, RecordError};
pub use value::{DataType, Decimal, ParseDecimalError, Value};
