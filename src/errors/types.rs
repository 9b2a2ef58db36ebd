//! Error type definitions for CronSync
//!
//! Errors are split by layer: `StoreError` describes failures talking to the
//! external key/value store, `CronSyncError` is what the coordinator and the
//! lifecycle manager hand back to their callers.

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the coordinator and lifecycle operations
#[derive(Error, Debug)]
pub enum CronSyncError {
    /// The trigger source rejected a schedule pattern. Raised before any
    /// registry or store interaction.
    #[error("Invalid cron pattern: {pattern} ({reason})")]
    InvalidPattern { pattern: String, reason: String },

    /// `stop_job`/`run_now` on an id this instance does not know
    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    /// Connectivity or timeout problem with the lock/stats store
    #[error("Lock store unavailable: {0}")]
    LockStoreUnavailable(#[from] StoreError),

    /// The job's task itself failed. Recorded in the stats record before
    /// being surfaced.
    #[error("Job '{name}' failed: {source}")]
    TaskExecution {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid or unusable configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

/// Failures of the external coordination store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection refused, dropped, or the server answered with an error
    #[error("{message}")]
    Unavailable { message: String },

    /// A command did not complete within the configured timeout
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// The connection was released by `disconnect`
    #[error("store connection is closed")]
    Closed,
}

impl CronSyncError {
    /// Create an invalid pattern error
    pub fn invalid_pattern<P: Into<String>, R: Into<String>>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a job not found error
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Wrap a task failure for the named job
    pub fn task_execution<S: Into<String>>(name: S, source: anyhow::Error) -> Self {
        Self::TaskExecution {
            name: name.into(),
            source,
        }
    }

    /// Whether the error came from the external store
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::LockStoreUnavailable(_))
    }
}

impl StoreError {
    /// Create an unavailable error from anything displayable
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a timeout error for the named operation
    pub fn timeout<S: Into<String>>(operation: S, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        Self::unavailable(error.to_string())
    }
}
