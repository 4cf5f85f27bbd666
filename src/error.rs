//! Error handling module for runkit
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Task-level failures (`TaskNonZeroExit`, `RetryExhausted`) are values callers
//! may choose to propagate; `ConfigNotFound`, `TaskSpawnFailure` and
//! `Interrupted` abort a whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for runkit
#[derive(Error, Debug)]
pub enum RunkitError {
    /// The config file given to the store does not exist
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The OS refused to create a child process
    #[error("Failed to spawn task `{command}`: {source}")]
    TaskSpawnFailure {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A single task exited with a non-zero status
    #[error("Task `{command}` exited with status {exit_code}")]
    TaskNonZeroExit { command: String, exit_code: i32 },

    /// Every attempt of a retried task failed
    #[error("Task `{command}` failed after {attempts} attempt(s), last status {exit_code}")]
    RetryExhausted {
        command: String,
        attempts: u32,
        exit_code: i32,
    },

    /// SIGINT/SIGTERM arrived before every queued task was launched
    #[error("Interrupted with {not_started} task(s) not started")]
    Interrupted { not_started: usize },

    /// The dispatcher was asked for an operation it does not know
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Validation errors (bad limits, bad arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors (file operations, process status queries)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for runkit operations
pub type Result<T> = std::result::Result<T, RunkitError>;

impl RunkitError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error should abort the surrounding run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_)
                | Self::TaskSpawnFailure { .. }
                | Self::Interrupted { .. }
                | Self::Io(_)
        )
    }

    /// Process exit code for a run that ended with this error
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Interrupted { .. } => crate::process_guard::INTERRUPTED_EXIT_CODE as u8,
            _ => 1,
        }
    }
}
