//! One coordinated execution attempt
//!
//! Every tick flows through here: take the job's lock, run the task, write
//! the stats record, release the lock. The release happens on every path; a
//! task that fails or panics, or a stats write that errors, still releases.
//!
//! Attempts in progress are tracked so shutdown can wait for them to finish
//! their bookkeeping before the store goes away.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::distributed_lock::DistributedLock;
use super::job_registry::JobRegistry;
use super::job_task::{JobTask, TaskContext};
use super::stats_store::{StatsRecord, StatsStore};
use super::types::{ExecutionOutcome, JobId, JobOptions};
use crate::errors::{CronSyncError, CronSyncResult};
use crate::observability::ExecutionMetrics;
use crate::store::{CoordinationStore, KeySpace};

/// What happened during one attempt, before deciding what to report
struct Attempt {
    outcome: ExecutionOutcome,
    ran_at: Option<DateTime<Utc>>,
    bookkeeping_error: Option<CronSyncError>,
}

impl Attempt {
    fn skipped() -> Self {
        Self {
            outcome: ExecutionOutcome::Skipped,
            ran_at: None,
            bookkeeping_error: None,
        }
    }

    /// A task failure takes precedence; it has already been recorded and the
    /// bookkeeping error logged. Otherwise the first bookkeeping error wins.
    fn into_result(self) -> CronSyncResult<ExecutionOutcome> {
        match (self.outcome, self.bookkeeping_error) {
            (outcome @ ExecutionOutcome::Failed { .. }, _) => Ok(outcome),
            (_, Some(error)) => Err(error),
            (outcome, None) => Ok(outcome),
        }
    }
}

pub struct ExecutionCoordinator {
    instance_id: String,
    lock: DistributedLock,
    stats: StatsStore,
    registry: Arc<JobRegistry>,
    metrics: ExecutionMetrics,
    in_flight: TaskTracker,
}

impl ExecutionCoordinator {
    pub fn new(
        instance_id: String,
        store: Arc<dyn CoordinationStore>,
        keys: KeySpace,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            instance_id,
            lock: DistributedLock::new(store.clone(), keys.clone()),
            stats: StatsStore::new(store, keys),
            registry,
            metrics: ExecutionMetrics::new(),
            in_flight: TaskTracker::new(),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    /// Attempts currently between their first step and their lock release
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait until every attempt in progress has written its stats and
    /// released its lock.
    pub async fn wait_idle(&self) {
        // A closed tracker still counts new attempts; `wait` only needs it closed
        self.in_flight.close();
        self.in_flight.wait().await;
    }

    /// Fresh owner token for one attempt: `<instance_id>:<uuid>`
    pub fn new_token(&self) -> String {
        format!("{}:{}", self.instance_id, Uuid::new_v4())
    }

    /// Run `task` under the lock for `job_name`, owned by `token` for at most
    /// `ttl`.
    ///
    /// Returns `Skipped` when someone else holds the lock. A failing task is
    /// reported as `Ok(Failed)` after its stats record is written and the lock
    /// released. Store failures are errors, including a failure to acquire.
    pub async fn attempt_run(
        &self,
        job_name: &str,
        token: &str,
        ttl: Duration,
        task: &dyn JobTask,
        options: &JobOptions,
    ) -> CronSyncResult<ExecutionOutcome> {
        self.in_flight
            .track_future(self.execute(job_name, token, ttl, task, options))
            .await?
            .into_result()
    }

    /// Tick path for a registered entry.
    ///
    /// Uses a fresh token, bumps the entry's run count when the task ran here
    /// and surfaces a task failure as `CronSyncError::TaskExecution`.
    pub async fn run_entry(&self, id: &JobId, ttl: Duration) -> CronSyncResult<ExecutionOutcome> {
        self.in_flight.track_future(self.run_tracked_entry(id, ttl)).await
    }

    async fn run_tracked_entry(
        &self,
        id: &JobId,
        ttl: Duration,
    ) -> CronSyncResult<ExecutionOutcome> {
        let entry = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| CronSyncError::job_not_found(id.as_str()))?;
        let token = self.new_token();

        let attempt = self
            .execute(&entry.name, &token, ttl, entry.task.as_ref(), &entry.options)
            .await?;
        if let Some(ran_at) = attempt.ran_at {
            if self.registry.record_run(id, ran_at).await.is_none() {
                debug!("Job {} was stopped while running; run not recorded locally", id);
            }
        }

        attempt.into_result()?.into_task_result(&entry.name)
    }

    async fn execute(
        &self,
        job_name: &str,
        token: &str,
        ttl: Duration,
        task: &dyn JobTask,
        options: &JobOptions,
    ) -> CronSyncResult<Attempt> {
        let Some(guard) = self.lock.try_lock(job_name, token, ttl).await? else {
            debug!("Lock not acquired for job '{}', skipping", job_name);
            self.metrics.record_skipped(job_name);
            return Ok(Attempt::skipped());
        };

        info!("Executing job: {} on instance: {}", job_name, self.instance_id);
        let ctx = TaskContext {
            job_name: job_name.to_string(),
            instance_id: self.instance_id.clone(),
            options: options.clone(),
        };

        let started = Instant::now();
        let result = AssertUnwindSafe(task.run(&ctx)).catch_unwind().await;
        let elapsed = started.elapsed();
        let ran_at = Utc::now();

        let (outcome, record) = match result {
            Ok(Ok(value)) => {
                info!("Job '{}' completed in {:?}", job_name, elapsed);
                (
                    ExecutionOutcome::Succeeded {
                        result: value,
                        duration: elapsed,
                    },
                    StatsRecord::success(ran_at, elapsed, &self.instance_id),
                )
            }
            Ok(Err(error)) => {
                error!("Job '{}' failed: {:#}", job_name, error);
                let record = StatsRecord::failure(ran_at, &error.to_string(), &self.instance_id);
                (ExecutionOutcome::Failed { error }, record)
            }
            Err(payload) => {
                let message = format!("task panicked: {}", panic_message(payload.as_ref()));
                error!("Job '{}' failed: {}", job_name, message);
                let record = StatsRecord::failure(ran_at, &message, &self.instance_id);
                (
                    ExecutionOutcome::Failed {
                        error: anyhow::anyhow!(message),
                    },
                    record,
                )
            }
        };
        self.metrics.record_outcome(job_name, outcome.label(), elapsed);

        let mut bookkeeping_error = None;
        if let Err(e) = self.stats.record(job_name, &record).await {
            error!("Failed to record stats for job '{}': {}", job_name, e);
            bookkeeping_error = Some(e);
        }

        match guard.release().await {
            Ok(true) => {}
            Ok(false) => self.metrics.record_release_noop(job_name),
            Err(e) => {
                error!("Failed to release lock for job '{}': {}", job_name, e);
                if bookkeeping_error.is_none() {
                    bookkeeping_error = Some(e);
                }
            }
        }

        Ok(Attempt {
            outcome,
            ran_at: Some(ran_at),
            bookkeeping_error,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
