#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cronsync::job_scheduling::{
    CoordinatorSettings, CronSync, ExecutionCoordinator, JobRegistry, JobTask, ManualTrigger,
    TaskContext, task_fn,
};
use cronsync::store::{KeySpace, MemoryStore};

pub const TTL: Duration = Duration::from_secs(5);

pub fn settings(instance_id: &str) -> CoordinatorSettings {
    CoordinatorSettings {
        instance_id: instance_id.to_string(),
        lock_timeout: TTL,
        key_prefix: String::new(),
    }
}

/// A lifecycle manager over a shared memory store, ticked by hand
pub fn instance(store: Arc<MemoryStore>, instance_id: &str) -> (CronSync, Arc<ManualTrigger>) {
    let trigger = Arc::new(ManualTrigger::new());
    let cronsync = CronSync::with_backend(settings(instance_id), store, trigger.clone());
    (cronsync, trigger)
}

pub fn coordinator(store: Arc<MemoryStore>, instance_id: &str) -> ExecutionCoordinator {
    ExecutionCoordinator::new(
        instance_id.to_string(),
        store,
        KeySpace::default(),
        Arc::new(JobRegistry::new()),
    )
}

/// Counts its runs, optionally taking `hold` to finish
pub fn counting_task(counter: Arc<AtomicUsize>, hold: Duration) -> Arc<dyn JobTask> {
    task_fn(move |ctx: TaskContext| {
        let counter = counter.clone();
        async move {
            if !hold.is_zero() {
                tokio::time::sleep(hold).await;
            }
            let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "job": ctx.job_name, "run": run }))
        }
    })
}

pub fn failing_task(message: &'static str) -> Arc<dyn JobTask> {
    task_fn(move |_ctx: TaskContext| async move { Err::<Value, _>(anyhow::anyhow!(message)) })
}
