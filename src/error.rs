//! Error types for the rdma-cdi library

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rdma-cdi operations
#[derive(Error, Debug)]
pub enum RdmaCdiError {
    /// No matching hardware or files (no char devices, no PCI device, empty scan)
    #[error("not found: {0}")]
    NotFound(String),

    /// Hardware present but incomplete, or empty input to a builder
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem operation failed on a specific path
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Unsupported serialization format requested
    #[error("unsupported format {0:?}: use json or yaml")]
    Format(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Some devices of a per-device batch failed
    #[error("{failed} of {total} device(s) failed to generate")]
    Batch {
        /// Number of failed devices
        failed: usize,
        /// Number of devices attempted
        total: usize,
    },
}

impl RdmaCdiError {
    /// Wrap an I/O error together with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => {
                RdmaCdiError::NotFound(format!("{}: {}", path.into().display(), source))
            }
            _ => RdmaCdiError::Io {
                path: path.into(),
                source,
            },
        }
    }

    /// True for the not-found class of errors
    pub fn is_not_found(&self) -> bool {
        matches!(self, RdmaCdiError::NotFound(_))
    }
}

impl From<io::Error> for RdmaCdiError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => RdmaCdiError::NotFound(err.to_string()),
            _ => RdmaCdiError::Io {
                path: PathBuf::new(),
                source: err,
            },
        }
    }
}

/// Result type for rdma-cdi operations
pub type Result<T> = std::result::Result<T, RdmaCdiError>;
