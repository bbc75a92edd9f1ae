//! Connector configuration
//!
//! Tagged by `type`, as it appears in pipeline files:
//!
//! ```yaml
//! source:
//!   type: file
//!   path: customers.json
//! destination:
//!   type: api
//!   url: https://example.com/ingest
//!   auth:
//!     type: bearer
//!     token: secret
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    ConnectorError, DestinationWriter, FileDestination, FileSource, HttpDestination, HttpSource, MemoryDestination,
    MemorySource, SourceReader,
};

/// Default per-call HTTP timeout in milliseconds
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectorConfig {
    File(FileConnectorConfig),
    Api(HttpConnectorConfig),
    /// Inline records; as a destination, batches are kept in memory
    Memory {
        #[serde(default)]
        data: Value,
    },
}

impl ConnectorConfig {
    /// Build a source; relative file paths resolve against `base_dir`
    pub fn build_source(&self, base_dir: &Path, timeout_ms: u64) -> Result<Arc<dyn SourceReader>, ConnectorError> {
        debug!(?self, "ConnectorConfig::build_source: called");
        match self {
            Self::File(cfg) => Ok(Arc::new(FileSource::new(cfg.resolved(base_dir)))),
            Self::Api(cfg) => Ok(Arc::new(HttpSource::new(cfg.clone(), timeout_ms)?)),
            Self::Memory { data } => Ok(Arc::new(MemorySource::new(data.clone()))),
        }
    }

    /// Build a destination; relative file paths resolve against `base_dir`
    pub fn build_destination(
        &self,
        base_dir: &Path,
        timeout_ms: u64,
    ) -> Result<Arc<dyn DestinationWriter>, ConnectorError> {
        debug!(?self, "ConnectorConfig::build_destination: called");
        match self {
            Self::File(cfg) => Ok(Arc::new(FileDestination::new(cfg.resolved(base_dir)))),
            Self::Api(cfg) => Ok(Arc::new(HttpDestination::new(cfg.clone(), timeout_ms)?)),
            Self::Memory { .. } => Ok(Arc::new(MemoryDestination::new())),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Api(_) => "api",
            Self::Memory { .. } => "memory",
        }
    }
}

/// File layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// From the extension: `.jsonl` / `.ndjson` are JSON Lines, `.csv` is CSV,
    /// anything else JSON
    #[default]
    Auto,
    Json,
    Jsonl,
    /// Header row plus one row per record
    Csv,
}

/// How a file destination treats existing content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    #[default]
    Append,
    /// Truncate on the first batch of a run, append after
    Overwrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConnectorConfig {
    pub path: PathBuf,

    #[serde(default)]
    pub format: FileFormat,

    #[serde(default)]
    pub mode: WriteMode,
}

impl FileConnectorConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            format: FileFormat::Auto,
            mode: WriteMode::Append,
        }
    }

    fn resolved(&self, base_dir: &Path) -> Self {
        let mut cfg = self.clone();
        if cfg.path.is_relative() {
            cfg.path = base_dir.join(&cfg.path);
        }
        cfg
    }

    /// Format after resolving `Auto`
    pub fn effective_format(&self) -> FileFormat {
        match self.format {
            FileFormat::Auto => match self.path.extension().and_then(|e| e.to_str()) {
                Some("jsonl") | Some("ndjson") => FileFormat::Jsonl,
                Some("csv") => FileFormat::Csv,
                _ => FileFormat::Json,
            },
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
    Patch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HttpAuth {
    Basic {
        username: String,
        #[serde(default)]
        password: Option<String>,
    },
    Bearer {
        token: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConnectorConfig {
    pub url: String,

    #[serde(default)]
    pub headers: IndexMap<String, String>,

    /// Query parameters sent with fetches
    #[serde(default)]
    pub params: IndexMap<String, Value>,

    /// Method used for sends
    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub auth: Option<HttpAuth>,

    /// Overrides the configured default timeout
    #[serde(default, rename = "timeout-ms", alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,
}

impl HttpConnectorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: IndexMap::new(),
            params: IndexMap::new(),
            method: HttpMethod::Post,
            auth: None,
            timeout_ms: None,
        }
    }

    pub fn timeout(&self, default_ms: u64) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(default_ms))
    }
}
