//! Integrator configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::{BatchProcessor, DEFAULT_BATCH_SIZE, DEFAULT_MAX_ERROR_MESSAGES};
use crate::connector::DEFAULT_HTTP_TIMEOUT_MS;

/// Main Integrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level used when `--log-level` is not given
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Batch processing settings
    pub batch: BatchConfig,

    /// Storage configuration
    pub storage: StorageConfig,

    /// HTTP connector defaults
    pub http: HttpConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.batch.batch_size == 0 {
            return Err(eyre::eyre!("batch.batch-size must be at least 1"));
        }
        if self.http.timeout_ms == 0 {
            return Err(eyre::eyre!("http.timeout-ms must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .integrator.yml
        let local_config = PathBuf::from(".integrator.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/integrator/integrator.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("integrator").join("integrator.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// BatchProcessor built from the batch section
    pub fn processor(&self) -> BatchProcessor {
        BatchProcessor::new(self.batch.batch_size)
            .with_max_error_messages(self.batch.max_error_messages)
            .with_stop_on_cancel(self.batch.cancel_between_batches)
    }
}

/// Batch processing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Records per destination call
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Batch error messages kept in a job's error log
    #[serde(rename = "max-error-messages")]
    pub max_error_messages: usize,

    /// Stop a cancelled job before its next batch
    #[serde(rename = "cancel-between-batches")]
    pub cancel_between_batches: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_error_messages: DEFAULT_MAX_ERROR_MESSAGES,
            cancel_between_batches: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the job store
    #[serde(rename = "store-dir")]
    pub store_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // XDG data directory (~/.local/share/integrator on Linux)
        let store_dir = dirs::data_dir()
            .map(|d| d.join("integrator"))
            .unwrap_or_else(|| PathBuf::from(".integrator"))
            .to_string_lossy()
            .into_owned();

        Self { store_dir }
    }
}

impl StorageConfig {
    /// Store dir with a leading `~/` expanded
    pub fn store_path(&self) -> PathBuf {
        if let Some(rest) = self.store_dir.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(rest);
        }
        PathBuf::from(&self.store_dir)
    }
}

/// HTTP connector defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Request timeout for connectors that do not set their own
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}
