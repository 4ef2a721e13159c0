//! Typed error hierarchy for the runway engine.
//!
//! `RunwayError` is returned by every store, the engine, and recovery. The
//! cleanup sweep never fails as a whole; it reports per-run `CleanupFailure`
//! entries instead (see `crate::cleanup`).
//!
//! Every variant maps to a stable machine-readable code via [`RunwayError::code`].

use runway_common::{ParseError, RunId, RunStatus};
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = RunwayError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RunwayError {
    /// A referenced workflow definition or configuration value does not resolve.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run is not in a status that permits the requested operation.
    #[error("Run {run_id} is {status}; cannot {operation}")]
    InvalidState {
        run_id: RunId,
        status: RunStatus,
        operation: String,
    },

    #[error("Run {0} not found")]
    RunNotFound(String),

    #[error("Checkpoint {0} not found")]
    CheckpointNotFound(String),

    #[error("Work item {0} not found")]
    WorkItemNotFound(String),

    /// Malformed event or parameters; correctable by the caller.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Run {run_id} is locked by another writer")]
    Locked { run_id: RunId },

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RunwayError {
    /// Stable error code, safe to match on from scripts and tool callers.
    pub fn code(&self) -> &'static str {
        match self {
            RunwayError::Configuration(_) => "configuration_error",
            RunwayError::InvalidState { .. } | RunwayError::Locked { .. } => "invalid_state",
            RunwayError::RunNotFound(_)
            | RunwayError::CheckpointNotFound(_)
            | RunwayError::WorkItemNotFound(_) => "not_found",
            RunwayError::Validation(_) => "validation_error",
            RunwayError::Storage { .. } => "storage_error",
            RunwayError::Serialization { .. } => "serialization_error",
        }
    }

    /// Whether repeating the same call unchanged could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RunwayError::Storage { .. } | RunwayError::Locked { .. })
    }

    pub(crate) fn invalid_state(run_id: &RunId, status: RunStatus, operation: &str) -> Self {
        RunwayError::InvalidState {
            run_id: run_id.clone(),
            status,
            operation: operation.to_string(),
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RunwayError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn serialization(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        RunwayError::Serialization {
            path: path.into(),
            source,
        }
    }
}

impl From<ParseError> for RunwayError {
    fn from(err: ParseError) -> Self {
        RunwayError::Validation(err.to_string())
    }
}
