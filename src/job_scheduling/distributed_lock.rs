//! Mutual exclusion across instances for one job name
//!
//! A lock is the key `lock:<name>` holding the owner token of whoever set it,
//! with the lock timeout as its TTL. Only the holder of the matching token may
//! delete it; a release by anyone else is a silent no-op.

use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::errors::CronSyncResult;
use crate::store::{CoordinationStore, KeySpace};

#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CoordinationStore>,
    keys: KeySpace,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CoordinationStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Try to take the lock for `job_name`.
    ///
    /// Returns false when the key already exists, whoever owns it. Store
    /// failures are errors, never a false.
    pub async fn acquire(
        &self,
        job_name: &str,
        token: &str,
        ttl: Duration,
    ) -> CronSyncResult<bool> {
        let key = self.keys.lock_key(job_name);
        Ok(self.store.set_if_absent(&key, token, ttl).await?)
    }

    /// Delete the lock if, and only if, it still holds `token`.
    ///
    /// Returns whether the key was deleted. A lock that expired or was taken
    /// over by another owner is left alone and reported as `Ok(false)`.
    pub async fn release(&self, job_name: &str, token: &str) -> CronSyncResult<bool> {
        let key = self.keys.lock_key(job_name);
        let deleted = self.store.delete_if_equals(&key, token).await?;
        if !deleted {
            debug!(
                "Lock for job '{}' no longer held by {}; release skipped",
                job_name, token
            );
        }
        Ok(deleted)
    }

    /// Acquire and wrap the lock in a guard that releases it when dropped.
    pub async fn try_lock(
        &self,
        job_name: &str,
        token: &str,
        ttl: Duration,
    ) -> CronSyncResult<Option<LockGuard>> {
        if !self.acquire(job_name, token, ttl).await? {
            return Ok(None);
        }
        Ok(Some(LockGuard {
            lock: self.clone(),
            job_name: job_name.to_string(),
            token: token.to_string(),
            released: false,
        }))
    }
}

/// Held lock for one job name.
///
/// Call [`LockGuard::release`] to release and observe the result. A guard
/// dropped without it (panic, cancelled future) releases in the background.
pub struct LockGuard {
    lock: DistributedLock,
    job_name: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn release(mut self) -> CronSyncResult<bool> {
        self.released = true;
        self.lock.release(&self.job_name, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let lock = self.lock.clone();
        let job_name = std::mem::take(&mut self.job_name);
        let token = std::mem::take(&mut self.token);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release(&job_name, &token).await {
                        warn!("Background release of lock for job '{}' failed: {}", job_name, e);
                    }
                });
            }
            Err(_) => warn!(
                "Lock for job '{}' dropped outside a runtime; it will expire on its own",
                job_name
            ),
        }
    }
}
