//! External coordination store
//!
//! Every instance of a deployment talks to the same store. The lock and the
//! stats record are built on the handful of primitives in
//! [`CoordinationStore`]; the Redis backend is what production uses, the
//! memory backend serves single-instance runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::StoreResult;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use self::redis::RedisStore;

/// Primitive operations against the shared store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Set `key` to `value` with expiry `ttl` only if the key is absent.
    /// Returns true iff this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `value`, as one atomic step.
    /// Returns true iff the key was deleted.
    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool>;

    /// Replace the whole hash at `key` with `fields`
    async fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()>;

    /// All fields of the hash at `key`; empty when the key is absent
    async fn read_hash(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Round trip to prove the store is reachable
    async fn ping(&self) -> StoreResult<()>;

    /// Release the connection. Safe to call more than once.
    async fn close(&self);
}

/// Key layout shared by every instance of a deployment.
///
/// With the default empty prefix the keys are `lock:<name>` and
/// `stats:<name>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lock_key(&self, job_name: &str) -> String {
        format!("{}lock:{job_name}", self.prefix)
    }

    pub fn stats_key(&self, job_name: &str) -> String {
        format!("{}stats:{job_name}", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_key_layout() {
        let keys = KeySpace::default();
        assert_eq!(keys.lock_key("backup"), "lock:backup");
        assert_eq!(keys.stats_key("backup"), "stats:backup");
    }

    #[test]
    fn test_prefixed_key_layout() {
        let keys = KeySpace::new("cronsync:");
        assert_eq!(keys.lock_key("backup"), "cronsync:lock:backup");
        assert_eq!(keys.stats_key("backup"), "cronsync:stats:backup");
    }
}
