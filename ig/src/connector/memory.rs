//! In-memory connector for embedders and tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::Record;

use super::{ConnectorError, DestinationWriter, SourceReader};

/// Returns a fixed value, or a fixed error
pub struct MemorySource {
    data: Result<Value, String>,
}

impl MemorySource {
    pub fn new(data: Value) -> Self {
        Self { data: Ok(data) }
    }

    /// A source whose fetch always fails with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            data: Err(message.into()),
        }
    }

    /// `count` records of the form `{"id": n, "name": "record-n"}`, 1-based
    pub fn numbered(count: usize) -> Self {
        let records = (1..=count)
            .map(|n| serde_json::json!({"id": n, "name": format!("record-{}", n)}))
            .collect();
        Self::new(Value::Array(records))
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch(&self) -> Result<Value, ConnectorError> {
        debug!("MemorySource::fetch: called");
        self.data.clone().map_err(ConnectorError::Rejected)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Keeps every delivered batch; selected sends can be made to fail
#[derive(Default)]
pub struct MemoryDestination {
    batches: Mutex<Vec<Vec<Record>>>,
    failures: HashMap<usize, String>,
    sends: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th send (1-based) with `message`
    pub fn fail_on_send(mut self, n: usize, message: impl Into<String>) -> Self {
        self.failures.insert(n, message.into());
        self
    }

    /// Sleep before each send
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Batches accepted so far
    pub async fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().await.clone()
    }

    /// All accepted records, in delivery order
    pub async fn records(&self) -> Vec<Record> {
        self.batches.lock().await.iter().flatten().cloned().collect()
    }

    /// Number of send calls, failed ones included
    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DestinationWriter for MemoryDestination {
    async fn send(&self, records: &[Record]) -> Result<(), ConnectorError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(send = n, record_count = records.len(), "MemoryDestination::send: called");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failures.get(&n) {
            debug!(send = n, "MemoryDestination::send: configured failure");
            return Err(ConnectorError::Rejected(message.clone()));
        }
        self.batches.lock().await.push(records.to_vec());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_source_returns_data() {
        let source = MemorySource::new(json!([{"a": 1}]));
        assert_eq!(source.fetch().await.unwrap(), json!([{"a": 1}]));
    }

    #[tokio::test]
    async fn test_failing_source() {
        let err = MemorySource::failing("connection refused").fetch().await.unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn test_numbered() {
        let data = MemorySource::numbered(3).fetch().await.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 3);
        assert_eq!(data[2], json!({"id": 3, "name": "record-3"}));
    }

    #[tokio::test]
    async fn test_destination_records_and_failures() {
        let dest = MemoryDestination::new().fail_on_send(2, "boom");
        let batch = vec![json!({"a": 1}).as_object().cloned().unwrap()];

        dest.send(&batch).await.unwrap();
        assert_eq!(dest.send(&batch).await.unwrap_err().to_string(), "boom");
        dest.send(&batch).await.unwrap();

        assert_eq!(dest.send_count(), 3);
        assert_eq!(dest.batches().await.len(), 2);
        assert_eq!(dest.records().await.len(), 2);
    }
}
