//! Redis backend for the coordination store

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info};

use super::CoordinationStore;
use crate::errors::{StoreError, StoreResult};

/// Compare-and-delete, evaluated server side so nothing can change the key
/// between the GET and the DEL.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
  return redis.call("del", KEYS[1])
else
  return 0
end
"#;

/// Redis-backed store over an auto-reconnecting connection manager
pub struct RedisStore {
    connection: RwLock<Option<ConnectionManager>>,
    command_timeout: Duration,
    release_script: Script,
}

impl RedisStore {
    /// Connect and verify the server answers. Any failure here is fatal for
    /// the caller; an instance must not run without its store.
    pub async fn connect(url: &str, command_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = timeout(command_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::timeout("connect", command_timeout))??;

        let store = Self {
            connection: RwLock::new(Some(manager)),
            command_timeout,
            release_script: Script::new(RELEASE_SCRIPT),
        };
        store.ping().await?;

        info!("Connected to Redis at {}", redact_url(url));
        Ok(store)
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        self.connection.read().await.clone().ok_or(StoreError::Closed)
    }

    /// Run a command future under the configured timeout
    async fn bounded<T, F>(&self, operation: &str, command: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match timeout(self.command_timeout, command).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::timeout(operation, self.command_timeout)),
        }
    }
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        let reply = self
            .bounded("SET NX", async move {
                let reply: Option<String> = redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_ms)
                    .query_async(&mut conn)
                    .await?;
                Ok::<_, RedisError>(reply)
            })
            .await?;

        Ok(reply.is_some())
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let script = &self.release_script;

        let deleted = self
            .bounded("release script", async move {
                let deleted: i64 = script.key(key).arg(value).invoke_async(&mut conn).await?;
                Ok::<_, RedisError>(deleted)
            })
            .await?;

        Ok(deleted > 0)
    }

    async fn replace_hash(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !fields.is_empty() {
            pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                pipe.arg(field).arg(value);
            }
            pipe.ignore();
        }

        self.bounded("HSET", async move {
            let _: () = pipe.query_async(&mut conn).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn read_hash(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection().await?;

        self.bounded("HGETALL", async move {
            let fields: HashMap<String, String> =
                redis::cmd("HGETALL").arg(key).query_async(&mut conn).await?;
            Ok::<_, RedisError>(fields)
        })
        .await
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;

        let pong = self
            .bounded("PING", async move {
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok::<_, RedisError>(pong)
            })
            .await?;

        debug!("Redis answered PING with {}", pong);
        Ok(())
    }

    async fn close(&self) {
        if self.connection.write().await.take().is_some() {
            info!("Redis connection released");
        }
    }
}

/// Hide credentials when logging a connection URL
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
