/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Redis defaults
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_KEY_PREFIX: &str = "";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 5;

// Coordinator defaults
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 300_000;

// Web server defaults
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5500;

// Logging defaults
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Config file
pub const DEFAULT_CONFIG_FILE: &str = "cronsync.toml";
pub const ENV_PREFIX: &str = "CRONSYNC_";
