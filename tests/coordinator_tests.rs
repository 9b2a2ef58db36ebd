//! Cross-instance behaviour of the execution coordinator over a shared store

mod common;

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{TTL, coordinator, counting_task, failing_task};
use cronsync::errors::CronSyncError;
use cronsync::job_scheduling::{
    ExecutionOutcome, JobOptions, JobStatus, JobTask, TaskContext, task_fn,
};
use cronsync::store::MemoryStore;

#[tokio::test(start_paused = true)]
async fn concurrent_attempts_run_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone(), Duration::from_millis(100));
    let coordinators: Vec<_> = (0..8)
        .map(|i| coordinator(store.clone(), &format!("instance-{i}")))
        .collect();

    let options = JobOptions::new();
    let attempts = coordinators.iter().enumerate().map(|(i, coordinator)| {
        let task = task.clone();
        let options = options.clone();
        async move {
            coordinator
                .attempt_run("report", &format!("token-{i}"), TTL, task.as_ref(), &options)
                .await
        }
    });
    let outcomes: Vec<ExecutionOutcome> = join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let ran = outcomes.iter().filter(|outcome| outcome.ran_locally()).count();
    let skipped = outcomes.iter().filter(|outcome| outcome.is_skipped()).count();
    assert_eq!(ran, 1);
    assert_eq!(skipped, 7);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn second_instance_skips_while_first_holds_lock() {
    let store = Arc::new(MemoryStore::new());
    let instance_a = coordinator(store.clone(), "instance-a");
    let instance_b = coordinator(store.clone(), "instance-b");
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone(), Duration::from_millis(50));
    let options = JobOptions::new();

    let (a, b) = tokio::join!(
        instance_a.attempt_run("backup", "token-a", TTL, task.as_ref(), &options),
        instance_b.attempt_run("backup", "token-b", TTL, task.as_ref(), &options),
    );

    assert!(matches!(a.unwrap(), ExecutionOutcome::Succeeded { .. }));
    assert!(b.unwrap().is_skipped());
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let stats = instance_b.stats().get("backup").await.unwrap();
    assert_eq!(stats.status, Some(JobStatus::Success));
    assert_eq!(stats.instance_id.as_deref(), Some("instance-a"));
    assert_eq!(store.value("lock:backup").await, None);
}

/// Tracks how many runs overlap in time
fn overlapping_task(
    running: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
    hold: Duration,
) -> Arc<dyn JobTask> {
    task_fn(move |_ctx: TaskContext| {
        let running = running.clone();
        let max_seen = max_seen.clone();
        async move {
            let now_running = running.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now_running, Ordering::SeqCst);
            tokio::time::sleep(hold).await;
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        }
    })
}

// The lock is never renewed: a task outliving its TTL loses exclusivity.
#[tokio::test(start_paused = true)]
async fn expired_lock_lets_a_second_run_overlap() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = Arc::new(coordinator(store.clone(), "instance-a"));
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let task = overlapping_task(running.clone(), max_seen.clone(), Duration::from_millis(300));

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        let task = task.clone();
        async move {
            coordinator
                .attempt_run(
                    "backup",
                    "token-1",
                    Duration::from_millis(100),
                    task.as_ref(),
                    &JobOptions::new(),
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.value("lock:backup").await, None);

    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        let task = task.clone();
        async move {
            coordinator
                .attempt_run(
                    "backup",
                    "token-2",
                    Duration::from_secs(1),
                    task.as_ref(),
                    &JobOptions::new(),
                )
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.value("lock:backup").await.as_deref(), Some("token-2"));

    // The first run ends while token-2 owns the key; its release must not touch it
    let first = first.await.unwrap().unwrap();
    assert!(matches!(first, ExecutionOutcome::Succeeded { .. }));
    assert_eq!(store.value("lock:backup").await.as_deref(), Some("token-2"));

    let second = second.await.unwrap().unwrap();
    assert!(matches!(second, ExecutionOutcome::Succeeded { .. }));
    assert_eq!(store.value("lock:backup").await, None);
    assert_eq!(max_seen.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_task_is_recorded_and_lock_released() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator(store.clone(), "instance-a");
    let task = failing_task("boom");

    let outcome = coordinator
        .attempt_run("backup", "token-a", TTL, task.as_ref(), &JobOptions::new())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ExecutionOutcome::Failed { ref error } if error.to_string() == "boom"
    ));

    let stats = coordinator.stats().get("backup").await.unwrap();
    assert_eq!(stats.status, Some(JobStatus::Error));
    assert_eq!(stats.error.as_deref(), Some("boom"));
    assert_eq!(stats.duration_ms, None);
    assert!(stats.last_run.is_some());

    assert!(
        coordinator
            .lock()
            .acquire("backup", "token-z", TTL)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn release_with_foreign_token_is_a_noop() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator(store.clone(), "instance-a");
    let lock = coordinator.lock();

    assert!(lock.acquire("backup", "token-a", TTL).await.unwrap());
    assert!(!lock.release("backup", "token-b").await.unwrap());
    assert_eq!(store.value("lock:backup").await.as_deref(), Some("token-a"));

    assert!(!lock.release("never-locked", "token-a").await.unwrap());
    assert!(lock.release("backup", "token-a").await.unwrap());
}

#[tokio::test]
async fn store_outage_is_an_error_not_a_skip() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator(store.clone(), "instance-a");
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone(), Duration::ZERO);

    store.set_available(false);
    let result = coordinator
        .attempt_run("backup", "token-a", TTL, task.as_ref(), &JobOptions::new())
        .await;

    assert!(matches!(result, Err(CronSyncError::LockStoreUnavailable(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn own_unexpired_lock_blocks_a_new_attempt() {
    let store = Arc::new(MemoryStore::new());
    let coordinator = coordinator(store.clone(), "instance-a");
    let counter = Arc::new(AtomicUsize::new(0));
    let task = counting_task(counter.clone(), Duration::ZERO);

    let held = coordinator.new_token();
    assert!(coordinator.lock().acquire("backup", &held, TTL).await.unwrap());

    let outcome = coordinator
        .attempt_run("backup", &coordinator.new_token(), TTL, task.as_ref(), &JobOptions::new())
        .await
        .unwrap();
    assert!(outcome.is_skipped());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(coordinator.stats().get("backup").await.unwrap().is_empty());
}
