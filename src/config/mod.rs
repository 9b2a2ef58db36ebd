use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::errors::{CronSyncError, CronSyncResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection to the shared lock/stats store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Namespace prepended to `lock:<name>` and `stats:<name>`.
    /// Empty by default; deployments that share keys with namespaced
    /// instances set it to e.g. "cronsync:".
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Upper bound for a single store command
    #[serde(default = "default_command_timeout", with = "duration_serde::duration")]
    pub command_timeout: Duration,
}

/// Behaviour of the execution coordinator on this instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Identifier written to stats records; a UUID is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    /// Lock TTL. Numbers are milliseconds.
    #[serde(default = "default_lock_timeout", with = "duration_serde::duration_millis")]
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS)
}

fn default_lock_timeout() -> Duration {
    Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS)
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            command_timeout: default_command_timeout(),
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            instance_id: None,
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load from the file named by `CONFIG_FILE` (or `cronsync.toml`)
    pub fn load() -> CronSyncResult<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Layer defaults, the TOML file (if present) and the environment.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> CronSyncResult<Self> {
        let config: Config = Self::figment(config_file.as_ref())
            .extract()
            .map_err(|e| CronSyncError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The provider stack: defaults, file, `CRONSYNC_*` (nested with `__`),
    /// then the plain variable names older deployments use.
    pub fn figment(config_file: &Path) -> Figment {
        let legacy = Env::raw()
            .only(&["REDIS_URL", "PORT", "LOG_LEVEL"])
            .map(|key| {
                let mapped = match key.as_str().to_ascii_uppercase().as_str() {
                    "REDIS_URL" => "redis.url",
                    "PORT" => "web.port",
                    _ => "logging.level",
                };
                mapped.into()
            });

        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(legacy)
    }

    pub fn validate(&self) -> CronSyncResult<()> {
        if self.redis.url.trim().is_empty() {
            return Err(CronSyncError::configuration("redis.url must not be empty"));
        }
        if self.coordinator.lock_timeout.is_zero() {
            return Err(CronSyncError::configuration(
                "coordinator.lock_timeout must be greater than zero",
            ));
        }
        if self.redis.command_timeout.is_zero() {
            return Err(CronSyncError::configuration(
                "redis.command_timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Write a default config file. Refuses to overwrite an existing one.
    pub fn write_default<P: AsRef<Path>>(config_file: P) -> anyhow::Result<bool> {
        let path = config_file.as_ref();
        if path.exists() {
            return Ok(false);
        }
        let contents = toml::to_string_pretty(&Self::default())?;
        std::fs::write(path, contents)?;
        info!("Created default config file: {}", path.display());
        Ok(true)
    }
}
