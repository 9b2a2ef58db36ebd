//! Local registry of scheduled entries
//!
//! Entries live in a slot arena in insertion order with an id index on the
//! side. Nothing here is shared with other instances or persisted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::job_task::JobTask;
use super::trigger_source::Subscription;
use super::types::{JobId, JobOptions, JobSummary};

/// One call to `schedule`, as kept by the instance that made it
#[derive(Clone)]
pub struct JobEntry {
    pub id: JobId,
    pub name: String,
    pub pattern: String,
    pub task: Arc<dyn JobTask>,
    pub options: JobOptions,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub subscription: Arc<dyn Subscription>,
}

impl JobEntry {
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            created_at: self.created_at,
            last_run: self.last_run,
            run_count: self.run_count,
            is_running: self.subscription.is_running(),
        }
    }
}

impl fmt::Debug for JobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("created_at", &self.created_at)
            .field("last_run", &self.last_run)
            .field("run_count", &self.run_count)
            .field("is_running", &self.subscription.is_running())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    slots: Vec<Option<JobEntry>>,
    index: HashMap<JobId, usize>,
    vacant: usize,
}

impl RegistryInner {
    /// Drop empty slots once they outnumber live entries
    fn compact_if_sparse(&mut self) {
        if self.vacant <= self.index.len() {
            return;
        }
        self.slots.retain(Option::is_some);
        self.index = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|entry| (entry.id.clone(), slot)))
            .collect();
        self.vacant = 0;
    }

    fn entry_mut(&mut self, id: &JobId) -> Option<&mut JobEntry> {
        let slot = *self.index.get(id)?;
        self.slots.get_mut(slot)?.as_mut()
    }
}

#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry, replacing any entry with the same id in place
    pub async fn put(&self, entry: JobEntry) {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.entry_mut(&entry.id) {
            *existing = entry;
            return;
        }
        let slot = inner.slots.len();
        inner.index.insert(entry.id.clone(), slot);
        inner.slots.push(Some(entry));
    }

    pub async fn get(&self, id: &JobId) -> Option<JobEntry> {
        let inner = self.inner.read().await;
        let slot = *inner.index.get(id)?;
        inner.slots.get(slot)?.clone()
    }

    pub async fn remove(&self, id: &JobId) -> Option<JobEntry> {
        let mut inner = self.inner.write().await;
        let slot = inner.index.remove(id)?;
        let removed = inner.slots.get_mut(slot)?.take();
        inner.vacant += 1;
        inner.compact_if_sparse();
        removed
    }

    /// Live entries in insertion order
    pub async fn list(&self) -> Vec<JobEntry> {
        self.inner
            .read()
            .await
            .slots
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Remove and return every entry, in insertion order
    pub async fn drain(&self) -> Vec<JobEntry> {
        let mut inner = self.inner.write().await;
        let drained = inner.slots.drain(..).flatten().collect();
        inner.index.clear();
        inner.vacant = 0;
        drained
    }

    /// Note a run this instance performed. Returns the new run count, or
    /// `None` when the entry was removed in the meantime.
    pub async fn record_run(&self, id: &JobId, ran_at: DateTime<Utc>) -> Option<u64> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id)?;
        entry.last_run = Some(ran_at);
        entry.run_count += 1;
        Some(entry.run_count)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.index.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
