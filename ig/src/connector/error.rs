//! Connector error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by sources and destinations
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Invalid CSV in {origin}: {message}")]
    Csv { origin: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid connector config: {0}")]
    Config(String),

    #[error("{0}")]
    Rejected(String),
}

impl ConnectorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(origin: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Csv {
            origin: origin.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn parse(origin: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            origin: origin.to_string(),
            message: err.to_string(),
        }
    }
}
