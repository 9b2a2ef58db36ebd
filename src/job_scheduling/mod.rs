//! Distributed job scheduling for CronSync
//!
//! Every instance of a deployment schedules the same jobs and ticks at the
//! same instants; a per-name lock in the shared store decides which instance
//! actually runs each tick.
//!
//! The system is built around these components:
//! - `DistributedLock`: token-owned lock per job name with expiry
//! - `StatsStore`: latest execution result per job name, shared
//! - `JobRegistry`: the entries scheduled on this instance
//! - `ExecutionCoordinator`: lock, run, record, release for every tick
//! - `CronSync`: schedule/stop/list/stats/disconnect over the above
//! - `TriggerSource`: where ticks come from (`CronTrigger`, `ManualTrigger`)

pub mod distributed_lock;
pub mod execution_coordinator;
pub mod job_manager;
pub mod job_registry;
pub mod job_task;
pub mod stats_store;
pub mod trigger_source;
pub mod types;

pub use distributed_lock::{DistributedLock, LockGuard};
pub use execution_coordinator::ExecutionCoordinator;
pub use job_manager::{CoordinatorSettings, CronSync};
pub use job_registry::{JobEntry, JobRegistry};
pub use job_task::{FnTask, JobTask, ScriptTask, TaskContext, task_fn};
pub use stats_store::{JobStatus, StatsRecord, StatsStore};
pub use trigger_source::{
    CronTrigger, ManualTrigger, Subscription, TickCallback, TickFuture, TriggerSource,
    parse_schedule,
};
pub use types::*;
