use std::path::PathBuf;

use llmq_plugin::DocumentError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("context {path} is locked by another process")]
    LockContention { path: PathBuf },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse YAML context {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("failed to serialize context for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    #[error("invalid context name '{name}': {reason}")]
    InvalidContext { name: String, reason: &'static str },
}

impl StoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("no llmq process holds {path} open")]
    NotFound { path: PathBuf },

    #[error("permission denied while signalling pid {pid}")]
    PermissionDenied { pid: u32 },

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LocateError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
