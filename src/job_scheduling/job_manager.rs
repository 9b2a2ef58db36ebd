//! Job lifecycle: schedule, stop, list, stats, shutdown
//!
//! [`CronSync`] owns the local registry, the trigger source and the store
//! connection of one instance. Every tick of every entry goes through the
//! shared [`ExecutionCoordinator`].

use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::execution_coordinator::ExecutionCoordinator;
use super::job_registry::{JobEntry, JobRegistry};
use super::job_task::JobTask;
use super::stats_store::StatsRecord;
use super::trigger_source::{CronTrigger, TickCallback, TickFuture, TriggerSource};
use super::types::{ExecutionOutcome, JobId, JobOptions, JobSummary};
use crate::config::Config;
use crate::config::defaults::{DEFAULT_KEY_PREFIX, DEFAULT_LOCK_TIMEOUT_MS};
use crate::errors::{CronSyncError, CronSyncResult};
use crate::store::{CoordinationStore, KeySpace, RedisStore};

/// Per-instance coordination settings
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub instance_id: String,
    pub lock_timeout: Duration,
    pub key_prefix: String,
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            instance_id: config
                .coordinator
                .instance_id
                .clone()
                .unwrap_or_else(generate_instance_id),
            lock_timeout: config.coordinator.lock_timeout,
            key_prefix: config.redis.key_prefix.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            instance_id: generate_instance_id(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

fn generate_instance_id() -> String {
    Uuid::new_v4().to_string()
}

pub struct CronSync {
    settings: CoordinatorSettings,
    store: Arc<dyn CoordinationStore>,
    trigger: Arc<dyn TriggerSource>,
    registry: Arc<JobRegistry>,
    coordinator: Arc<ExecutionCoordinator>,
}

impl CronSync {
    /// Connect to the configured Redis and drive ticks from cron patterns.
    ///
    /// Fails when Redis cannot be reached; an instance never runs without
    /// its store.
    pub async fn connect(config: &Config) -> CronSyncResult<Self> {
        config.validate()?;
        let store = RedisStore::connect(&config.redis.url, config.redis.command_timeout).await?;
        Ok(Self::with_backend(
            CoordinatorSettings::from_config(config),
            Arc::new(store),
            Arc::new(CronTrigger::new()),
        ))
    }

    pub fn with_backend(
        settings: CoordinatorSettings,
        store: Arc<dyn CoordinationStore>,
        trigger: Arc<dyn TriggerSource>,
    ) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            settings.instance_id.clone(),
            store.clone(),
            KeySpace::new(settings.key_prefix.clone()),
            registry.clone(),
        ));
        info!("CronSync instance {} ready", settings.instance_id);

        Self {
            settings,
            store,
            trigger,
            registry,
            coordinator,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.settings.instance_id
    }

    pub fn lock_timeout(&self) -> Duration {
        self.settings.lock_timeout
    }

    pub fn coordinator(&self) -> &ExecutionCoordinator {
        &self.coordinator
    }

    /// Schedule `task` under `name` to tick on `pattern`.
    ///
    /// The pattern is checked first; an invalid one fails before anything
    /// touches the registry or the store.
    pub async fn schedule(
        &self,
        pattern: &str,
        name: &str,
        task: Arc<dyn JobTask>,
        options: JobOptions,
    ) -> CronSyncResult<JobId> {
        self.trigger.validate(pattern)?;

        let id = JobId::generate(name);
        let subscription = self
            .trigger
            .subscribe(pattern, self.tick_callback(id.clone(), name.to_string()))?;

        // Registered before starting so the first tick always finds its entry
        self.registry
            .put(JobEntry {
                id: id.clone(),
                name: name.to_string(),
                pattern: pattern.to_string(),
                task,
                options,
                created_at: Utc::now(),
                last_run: None,
                run_count: 0,
                subscription: subscription.clone(),
            })
            .await;
        subscription.start();

        info!("Scheduled job: {} ({}) with pattern: {}", name, id, pattern);
        Ok(id)
    }

    fn tick_callback(&self, id: JobId, name: String) -> TickCallback {
        let coordinator: Weak<ExecutionCoordinator> = Arc::downgrade(&self.coordinator);
        let ttl = self.settings.lock_timeout;

        Arc::new(move || -> TickFuture {
            let coordinator = coordinator.clone();
            let id = id.clone();
            let name = name.clone();
            Box::pin(async move {
                let Some(coordinator) = coordinator.upgrade() else {
                    return Ok(());
                };
                match coordinator.run_entry(&id, ttl).await {
                    Ok(_) => Ok(()),
                    Err(CronSyncError::JobNotFound { .. }) => {
                        debug!("Tick for stopped job '{}' ({}) ignored", name, id);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })
        })
    }

    /// Run an entry right away through the same path a tick takes
    pub async fn run_now(&self, id: &str) -> CronSyncResult<ExecutionOutcome> {
        self.coordinator
            .run_entry(&JobId::from(id), self.settings.lock_timeout)
            .await
    }

    /// Stop future ticks of `id` and forget it. A run already in progress
    /// finishes normally.
    pub async fn stop_job(&self, id: &str) -> CronSyncResult<()> {
        let entry = self
            .registry
            .remove(&JobId::from(id))
            .await
            .ok_or_else(|| CronSyncError::job_not_found(id))?;
        entry.subscription.stop();

        info!("Stopped job: {} ({})", entry.name, entry.id);
        Ok(())
    }

    pub async fn stop_all(&self) {
        let entries = self.registry.drain().await;
        for entry in &entries {
            entry.subscription.stop();
        }
        if !entries.is_empty() {
            info!("Stopped {} jobs", entries.len());
        }
    }

    /// Local entries in the order they were scheduled
    pub async fn list_jobs(&self) -> Vec<JobSummary> {
        self.registry
            .list()
            .await
            .iter()
            .map(JobEntry::summary)
            .collect()
    }

    /// Latest shared stats for a job name; the default record if it never ran
    pub async fn get_stats(&self, name: &str) -> CronSyncResult<StatsRecord> {
        self.coordinator.stats().get(name).await
    }

    /// Stop every job, let runs in progress finish their stats write and
    /// lock release, then release the store connection. Safe to repeat.
    pub async fn disconnect(&self) {
        self.stop_all().await;
        let in_flight = self.coordinator.in_flight();
        if in_flight > 0 {
            info!("Waiting for {} running jobs to finish", in_flight);
        }
        self.coordinator.wait_idle().await;
        self.store.close().await;
        info!("CronSync instance {} disconnected", self.settings.instance_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_scheduling::job_task::{TaskContext, task_fn};
    use crate::job_scheduling::trigger_source::ManualTrigger;
    use crate::store::MemoryStore;
    use serde_json::Value;

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            instance_id: "node-1".to_string(),
            lock_timeout: Duration::from_secs(5),
            key_prefix: String::new(),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.coordinator.instance_id = Some("worker-7".to_string());
        config.redis.key_prefix = "cronsync:".to_string();

        let settings = CoordinatorSettings::from_config(&config);
        assert_eq!(settings.instance_id, "worker-7");
        assert_eq!(settings.key_prefix, "cronsync:");
        assert_eq!(settings.lock_timeout, Duration::from_millis(300_000));
    }

    #[test]
    fn test_generated_instance_ids_differ() {
        let config = Config::default();
        assert_ne!(
            CoordinatorSettings::from_config(&config).instance_id,
            CoordinatorSettings::from_config(&config).instance_id
        );
    }

    #[tokio::test]
    async fn test_tick_after_stop_is_ignored() {
        let trigger = Arc::new(ManualTrigger::new());
        let cronsync = CronSync::with_backend(settings(), Arc::new(MemoryStore::new()), trigger);

        let id = cronsync
            .schedule(
                "* * * * *",
                "backup",
                task_fn(|_ctx: TaskContext| async { Ok(Value::Null) }),
                JobOptions::new(),
            )
            .await
            .unwrap();
        let callback = cronsync.tick_callback(id.clone(), "backup".to_string());
        cronsync.stop_job(id.as_str()).await.unwrap();

        assert!(callback().await.is_ok());
    }
}
