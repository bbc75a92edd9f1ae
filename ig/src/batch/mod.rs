//! Batch processor
//!
//! Slices a record set into fixed-size batches and runs map, transform and
//! send on each, strictly in order, aggregating successes and failures.

mod processor;

pub use processor::{
    BatchError, BatchProcessor, BatchSummary, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ERROR_MESSAGES, NoopProgress, ProgressObserver,
};
