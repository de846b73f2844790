//! Error types for sync operations
//!
//! Every per-target failure is a [`SyncError`]; the orchestrator records it
//! against the target and moves on. Parse failures of existing destination
//! files never show up here, the merger absorbs them.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse classification of a [`SyncError`], used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A destination would end up inside its own source
    StructuralViolation,
    /// The environment refused an operation (permissions, disk, races)
    Io,
    /// The canonical server set is invalid; the whole run is rejected
    MalformedInput,
    /// The run was interrupted before this target started
    Cancelled,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::StructuralViolation => "structural violation",
            ErrorKind::Io => "i/o failure",
            ErrorKind::MalformedInput => "malformed input",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Cannot replicate {source_root} onto {destination}: the paths overlap")]
    StructuralViolation {
        source_root: PathBuf,
        destination: PathBuf,
    },

    #[error("Source does not exist: {path}")]
    SourceMissing { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {format} document for {path}: {message}")]
    Serialize {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("Invalid MCP server name: {0:?}")]
    InvalidServerName(String),

    #[error("Duplicate MCP server name: {0}")]
    DuplicateServerName(String),

    #[error("Sync cancelled before target started")]
    Cancelled,
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::StructuralViolation { .. } => ErrorKind::StructuralViolation,
            SyncError::SourceMissing { .. }
            | SyncError::Io { .. }
            | SyncError::Serialize { .. } => ErrorKind::Io,
            SyncError::InvalidServerName(_) | SyncError::DuplicateServerName(_) => {
                ErrorKind::MalformedInput
            }
            SyncError::Cancelled => ErrorKind::Cancelled,
        }
    }
}
