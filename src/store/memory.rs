//! In-process coordination store
//!
//! Behaves like the Redis backend for the operations CronSync needs: keys
//! expire on the tokio clock, compare-and-delete happens under one lock.
//! Every call is counted, and an outage can be simulated, which is what the
//! tests lean on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CoordinationStore;
use crate::errors::{StoreError, StoreResult};

#[derive(Debug)]
struct ExpiringValue {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct MemoryState {
    values: HashMap<String, ExpiringValue>,
    hashes: HashMap<String, HashMap<String, String>>,
    closed: bool,
}

impl MemoryState {
    /// Drop `key` if its TTL has passed
    fn evict_expired(&mut self, key: &str, now: Instant) {
        if self
            .values
            .get(key)
            .is_some_and(|entry| entry.expires_at <= now)
        {
            self.values.remove(key);
        }
    }
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    calls: AtomicUsize,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            calls: AtomicUsize::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Number of store operations issued so far (including failed ones)
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate the store going away (`false`) or coming back (`true`)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current unexpired value of a plain key
    pub async fn value(&self, key: &str) -> Option<String> {
        let mut state = self.state.lock().await;
        state.evict_expired(key, Instant::now());
        state.values.get(key).map(|entry| entry.value.clone())
    }

    /// Fields of a hash key, readable even after `close`
    pub async fn hash(&self, key: &str) -> HashMap<String, String> {
        self.state
            .lock()
            .await
            .hashes
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn begin(&self, state: &MemoryState) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if state.closed {
            return Err(StoreError::Closed);
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("connection refused (simulated outage)"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        self.begin(&state)?;

        let now = Instant::now();
        state.evict_expired(key, now);
        if state.values.contains_key(key) {
            return Ok(false);
        }

        state.values.insert(
            key.to_string(),
            ExpiringValue {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        self.begin(&state)?;

        state.evict_expired(key, Instant::now());
        let matches = state
            .values
            .get(key)
            .is_some_and(|entry| entry.value == value);
        if matches {
            state.values.remove(key);
        }
        Ok(matches)
    }

    async fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        self.begin(&state)?;

        if fields.is_empty() {
            state.hashes.remove(key);
        } else {
            state
                .hashes
                .insert(key.to_string(), fields.iter().cloned().collect());
        }
        Ok(())
    }

    async fn read_hash(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let state = self.state.lock().await;
        self.begin(&state)?;

        Ok(state.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> StoreResult<()> {
        let state = self.state.lock().await;
        self.begin(&state)
    }

    async fn close(&self) {
        self.state.lock().await.closed = true;
    }
}
