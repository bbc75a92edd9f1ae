//! Source and destination connectors
//!
//! The core only talks to the capability traits: `SourceReader::fetch` pulls
//! the full record set, `DestinationWriter::send` delivers one batch.
//! Connection settings live inside each connector instance.

mod config;
mod error;
mod file;
mod http;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::Record;

pub use config::{
    ConnectorConfig, DEFAULT_HTTP_TIMEOUT_MS, FileConnectorConfig, FileFormat, HttpAuth, HttpConnectorConfig, HttpMethod,
    WriteMode,
};
pub use error::ConnectorError;
pub use file::{FileDestination, FileSource};
pub use http::{HttpDestination, HttpSource};
pub use memory::{MemoryDestination, MemorySource};

/// Pulls the complete source record set
///
/// The result is a JSON array of records or a single non-array value, which
/// the batch processor treats as one record.
#[async_trait]
pub trait SourceReader: Send + Sync {
    async fn fetch(&self) -> Result<Value, ConnectorError>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Delivers one batch of records
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    async fn send(&self, records: &[Record]) -> Result<(), ConnectorError>;

    /// Short description for logs
    fn describe(&self) -> String;
}
