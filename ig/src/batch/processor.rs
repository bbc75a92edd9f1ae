//! BatchProcessor - sequential map/transform/send over fixed-size batches

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::connector::{ConnectorError, DestinationWriter};
use crate::domain::{MappingConfig, Record};
use crate::mapper::{self, MappingError};
use crate::transform::CompiledRules;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_ERROR_MESSAGES: usize = 10;

/// Why a batch failed; the message lands in the job's error log
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Destination(#[from] ConnectorError),
}

/// Receives cumulative counters after every batch
#[async_trait]
pub trait ProgressObserver: Send + Sync {
    async fn record_progress(&self, processed: u64, failed: u64);

    /// Checked before each batch is dispatched
    fn is_cancelled(&self) -> bool;
}

/// Observer that ignores progress and never cancels
pub struct NoopProgress;

#[async_trait]
impl ProgressObserver for NoopProgress {
    async fn record_progress(&self, _processed: u64, _failed: u64) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Outcome of a processing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Records in batches the destination accepted
    pub processed: u64,
    /// Records in failed batches
    pub failed: u64,
    /// First batch error messages, `"batch <n>: <error>"`
    pub errors: Vec<String>,
    /// All batch errors, including those not retained
    pub error_count: usize,
    /// Batches dispatched
    pub batches: usize,
    /// Stopped early because the observer reported cancellation
    pub cancelled: bool,
}

impl BatchSummary {
    /// Retained errors joined with `"; "`, if any batch failed
    pub fn error_log(&self) -> Option<String> {
        if self.failed == 0 || self.errors.is_empty() {
            return None;
        }
        Some(self.errors.join("; "))
    }
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    batch_size: usize,
    max_error_messages: usize,
    stop_on_cancel: bool,
}

impl Default for BatchProcessor {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_error_messages: DEFAULT_MAX_ERROR_MESSAGES,
            stop_on_cancel: true,
        }
    }
}

impl BatchProcessor {
    pub fn new(batch_size: usize) -> Self {
        Self::default().with_batch_size(batch_size)
    }

    /// Records per batch; at least 1
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_max_error_messages(mut self, max: usize) -> Self {
        self.max_error_messages = max;
        self
    }

    /// Whether a cancelled observer stops the run before the next batch
    pub fn with_stop_on_cancel(mut self, stop: bool) -> Self {
        self.stop_on_cancel = stop;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Process a fetched record set
    ///
    /// An array is split into batches; any other value is one batch of one.
    pub async fn run(
        &self,
        data: &Value,
        mapping: &MappingConfig,
        rules: &CompiledRules,
        destination: &dyn DestinationWriter,
        progress: &dyn ProgressObserver,
    ) -> BatchSummary {
        let records: &[Value] = match data {
            Value::Array(items) => items,
            single => std::slice::from_ref(single),
        };
        debug!(
            record_count = records.len(),
            batch_size = self.batch_size,
            destination = %destination.describe(),
            "BatchProcessor::run: called"
        );

        let mut summary = BatchSummary::default();
        for (index, batch) in records.chunks(self.batch_size).enumerate() {
            let number = index + 1;
            if self.stop_on_cancel && progress.is_cancelled() {
                info!(batch = number, "BatchProcessor::run: cancelled, stopping before batch");
                summary.cancelled = true;
                break;
            }

            summary.batches += 1;
            let size = batch.len() as u64;
            match self.process_batch(batch, mapping, rules, destination).await {
                Ok(()) => {
                    debug!(batch = number, size, "BatchProcessor::run: batch delivered");
                    summary.processed += size;
                }
                Err(e) => {
                    warn!(batch = number, size, error = %e, "BatchProcessor::run: batch failed");
                    summary.failed += size;
                    summary.error_count += 1;
                    if summary.errors.len() < self.max_error_messages {
                        summary.errors.push(format!("batch {}: {}", number, e));
                    }
                }
            }
            progress.record_progress(summary.processed, summary.failed).await;
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            batches = summary.batches,
            cancelled = summary.cancelled,
            "BatchProcessor::run: done"
        );
        summary
    }

    /// Map, transform and send one batch; any error fails the whole batch
    async fn process_batch(
        &self,
        batch: &[Value],
        mapping: &MappingConfig,
        rules: &CompiledRules,
        destination: &dyn DestinationWriter,
    ) -> Result<(), BatchError> {
        let mapped = mapper::map_records(batch, mapping)?;
        let transformed: Vec<Record> = if rules.is_empty() {
            mapped
        } else {
            mapped.iter().map(|record| rules.transform_record(record)).collect()
        };
        destination.send(&transformed).await?;
        Ok(())
    }
}
