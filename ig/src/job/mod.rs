//! Job orchestration
//!
//! JobManager runs each started job as a tokio task that fetches the source,
//! hands the records to the BatchProcessor and records the outcome through
//! the StateManager.

mod manager;

pub use manager::{JobError, JobManager, JobTaskResult, NO_DATA_MESSAGE};
