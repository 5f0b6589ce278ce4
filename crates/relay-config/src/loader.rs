//! Configuration loader with file and environment variable support

use crate::{AppConfig, CacheBackend, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "relay.toml",
    "./config/config.toml",
    "./config/relay.toml",
    "/etc/relay/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable
    /// overrides, then validate the result.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var("RELAY_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `RELAY_*` overrides. `lookup` returns the raw value for a key.
/// Values that fail to parse are ignored with a warning.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    fn parsed<T: std::str::FromStr>(key: &str, val: String) -> Option<T> {
        match val.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(key, value = %val, "Ignoring unparseable environment override");
                None
            }
        }
    }

    // HTTP
    if let Some(val) = lookup("RELAY_HTTP_HOST") {
        config.http.host = val;
    }
    if let Some(port) = lookup("RELAY_HTTP_PORT").and_then(|v| parsed("RELAY_HTTP_PORT", v)) {
        config.http.port = port;
    }

    // Webhook
    if let Some(val) = lookup("RELAY_WEBHOOK_URL") {
        config.webhook.url = val;
    }
    if let Some(val) = lookup("RELAY_WEBHOOK_AUTH_KEY") {
        config.webhook.auth_key = val;
    }
    if let Some(secs) = lookup("RELAY_WEBHOOK_TIMEOUT_SECS").and_then(|v| parsed("RELAY_WEBHOOK_TIMEOUT_SECS", v)) {
        config.webhook.timeout_secs = secs;
    }

    // Scheduler
    if let Some(secs) = lookup("RELAY_SCHEDULER_INTERVAL_SECS").and_then(|v| parsed("RELAY_SCHEDULER_INTERVAL_SECS", v)) {
        config.scheduler.interval_secs = secs;
    }
    if let Some(size) = lookup("RELAY_SCHEDULER_BATCH_SIZE").and_then(|v| parsed("RELAY_SCHEDULER_BATCH_SIZE", v)) {
        config.scheduler.batch_size = size;
    }
    if let Some(auto) = lookup("RELAY_SCHEDULER_AUTO_START").and_then(|v| parsed("RELAY_SCHEDULER_AUTO_START", v)) {
        config.scheduler.auto_start = auto;
    }

    // Database
    if let Some(val) = lookup("RELAY_DATABASE_URL") {
        config.database.url = val;
    }
    if let Some(max) = lookup("RELAY_DATABASE_MAX_CONNECTIONS").and_then(|v| parsed("RELAY_DATABASE_MAX_CONNECTIONS", v)) {
        config.database.max_connections = max;
    }

    // Cache
    if let Some(val) = lookup("RELAY_CACHE_BACKEND") {
        match CacheBackend::parse(&val) {
            Some(backend) => config.cache.backend = backend,
            None => warn!(value = %val, "Unknown cache backend, keeping configured value"),
        }
    }
    if let Some(val) = lookup("RELAY_REDIS_URL") {
        config.cache.redis_url = val;
    }
    if let Some(ttl) = lookup("RELAY_CACHE_TTL_SECS").and_then(|v| parsed("RELAY_CACHE_TTL_SECS", v)) {
        config.cache.ttl_secs = ttl;
    }

    // General
    if let Some(dev) = lookup("RELAY_DEV_MODE").and_then(|v| parsed("RELAY_DEV_MODE", v)) {
        config.dev_mode = dev;
    }
}
