//! Error types for the CLI

use std::path::PathBuf;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Engine(#[from] metricset_engine::EngineError),

    #[error("{0}")]
    Common(#[from] metricset_common::Error),

    #[error("failed to read {path}: {source}")]
    ReadManifest {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("not a MetricSet manifest: {message}")]
    InvalidManifest { message: String },
}

impl Error {
    pub fn invalid_manifest(message: impl Into<String>) -> Self {
        Error::InvalidManifest {
            message: message.into(),
        }
    }
}
