//! Error types for fsnote.
//!
//! All errors in fsnote are strongly typed using thiserror.
//! Callers can match on the specific failure (bad arguments, device lookup,
//! lifecycle misuse) instead of parsing messages.

use std::path::PathBuf;

use thiserror::Error;

/// Validation errors that occur during argument checking.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("At least one path must be supplied")]
    EmptyPathList,

    #[error("Path at index {index} is empty")]
    EmptyPath {
        index: usize,
    },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Errors raised while resolving the device backing a watched path.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No such path: {}", path.display())]
    NotFound {
        path: PathBuf,
    },

    #[error("Failed to read metadata for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DeviceError {
    /// Classifies an I/O error from a metadata lookup.
    #[must_use]
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}

/// Watch stream lifecycle misuse.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("A watch stream is already active")]
    AlreadyWatching,

    #[error("No active watch")]
    NotWatching,

    #[error("No paths have been scheduled")]
    NotScheduled,
}

/// Execution errors that occur while running a watch stream.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Watch backend failed: {message}")]
    Backend {
        message: String,
    },

    #[error("Channel disconnected: {path}")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Failed to spawn dispatch thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read configuration: {message}")]
    Config {
        message: String,
    },
}

/// Top-level error type for fsnote.
#[derive(Debug, Error)]
pub enum FsNoteError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Device resolution failed: {0}")]
    Device(#[from] DeviceError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

impl FsNoteError {
    /// Creates a backend execution error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Execution(ExecutionError::Backend {
            message: message.into(),
        })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if device resolution failed.
    #[must_use]
    pub const fn is_device(&self) -> bool {
        matches!(self, Self::Device(_))
    }

    /// Returns true if this is a lifecycle misuse.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Lifecycle(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns the lifecycle error, if any.
    #[must_use]
    pub const fn as_lifecycle(&self) -> Option<LifecycleError> {
        match self {
            Self::Lifecycle(e) => Some(*e),
            _ => None,
        }
    }
}

/// Result type alias for fsnote operations.
pub type FsNoteResult<T> = Result<T, FsNoteError>;
