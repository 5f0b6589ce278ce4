//! Message Relay Configuration
//!
//! TOML-based configuration with environment variable overrides. Every
//! component receives the section it needs by value at construction time;
//! there is no process-wide config object.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub webhook: WebhookConfig,
    pub scheduler: SchedulerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,

    /// Development mode: in-memory cache, verbose defaults
    pub dev_mode: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Outbound webhook configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: String,
    /// Sent in the `x-ins-auth-key` header
    pub auth_key: String,
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000/webhook".to_string(),
            auth_key: String::new(),
            timeout_secs: 5,
        }
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dispatch scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub batch_size: u32,
    /// Start the dispatch loop at boot instead of waiting for `POST /messages/start`
    pub auto_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            batch_size: 2,
            auto_start: false,
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://message.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl CacheBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "redis" => Some(CacheBackend::Redis),
            "memory" | "in-memory" => Some(CacheBackend::Memory),
            _ => None,
        }
    }
}

/// Recent-sent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub redis_url: String,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://localhost:6379/0".to_string(),
            ttl_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject values the scheduler, cache or sender cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.batch_size == 0 {
            return Err(ConfigError::ValidationError("scheduler.batch_size must be greater than 0".into()));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::ValidationError("scheduler.interval_secs must be greater than 0".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::ValidationError("cache.ttl_secs must be greater than 0".into()));
        }
        if self.webhook.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("webhook.url is required".into()));
        }
        if self.webhook.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("webhook.timeout_secs must be greater than 0".into()));
        }
        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Message Relay Configuration
# RELAY_* environment variables override these settings

dev_mode = false

[http]
host = "0.0.0.0"
port = 8080

[webhook]
url = "http://localhost:9000/webhook"
auth_key = ""
timeout_secs = 5

[scheduler]
interval_secs = 120
batch_size = 2
auto_start = false

[database]
url = "sqlite://message.db?mode=rwc"
max_connections = 5

[cache]
backend = "redis"  # redis or memory
redis_url = "redis://localhost:6379/0"
ttl_secs = 3600
"#
        .to_string()
    }
}
