//! Centralized error handling for CronSync
//!
//! # Error Categories
//!
//! - **Invalid pattern**: schedule-time validation failures, no side effects
//! - **Job not found**: lifecycle operations on unknown ids, no side effects
//! - **Lock store unavailable**: connectivity/timeouts talking to the store
//! - **Task execution**: the job's own task failed (recorded, then surfaced)
//! - **Configuration**: invalid settings at start-up
//!
//! A lock that is held elsewhere is not an error; the coordinator reports it
//! as `ExecutionOutcome::Skipped`.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using CronSyncError
pub type CronSyncResult<T> = Result<T, CronSyncError>;

/// Convenience type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
