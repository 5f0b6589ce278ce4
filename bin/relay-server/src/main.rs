//! Message Relay Server
//!
//! Serves the HTTP API and owns the outbox dispatch scheduler.
//!
//! ## Configuration
//!
//! Read from a TOML file (`RELAY_CONFIG`, `config.toml`, `relay.toml`, ...)
//! and overridden by `RELAY_*` environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RELAY_HTTP_PORT` | `8080` | API port |
//! | `RELAY_WEBHOOK_URL` | `http://localhost:9000/webhook` | Webhook endpoint |
//! | `RELAY_WEBHOOK_AUTH_KEY` | - | Value of the `x-ins-auth-key` header |
//! | `RELAY_SCHEDULER_INTERVAL_SECS` | `120` | Time between dispatch ticks |
//! | `RELAY_SCHEDULER_BATCH_SIZE` | `2` | Messages per tick |
//! | `RELAY_SCHEDULER_AUTO_START` | `false` | Start dispatching at boot |
//! | `RELAY_DATABASE_URL` | `sqlite://message.db?mode=rwc` | SQLite database |
//! | `RELAY_CACHE_BACKEND` | `redis` | `redis` or `memory` |
//! | `RELAY_REDIS_URL` | `redis://localhost:6379/0` | Redis connection |
//! | `RELAY_CACHE_TTL_SECS` | `3600` | Cache entry lifetime |
//! | `RELAY_DEV_MODE` | `false` | Use the in-memory cache |
//! | `LOG_FORMAT` | `text` | `json` or `text` |
//! | `RUST_LOG` | `info` | Log level |

mod api;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use relay_config::{AppConfig, CacheBackend, ConfigLoader};
use relay_outbox::{
    DispatchScheduler, DispatchSchedulerConfig, HttpMessageSender, HttpSenderConfig,
    InMemorySentMessageCache, MessageRepository, MessageService, RedisSentMessageCache,
    SentMessageCache, SqliteMessageRepository,
};
use sqlx::sqlite::SqlitePoolOptions;
use tokio::signal;
use tracing::{error, info, warn};

use crate::api::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    relay_common::logging::init_logging("relay-server");

    let config = ConfigLoader::new().load()?;
    if config.dev_mode {
        info!("Running in dev mode");
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    let repository = Arc::new(SqliteMessageRepository::new(pool));
    repository.init_schema().await?;
    info!(url = %config.database.url, "Using SQLite message store");

    let cache = build_cache(&config).await;

    let sender = Arc::new(HttpMessageSender::new(HttpSenderConfig {
        url: config.webhook.url.clone(),
        auth_key: config.webhook.auth_key.clone(),
        connect_timeout: config.webhook.timeout(),
        request_timeout: config.webhook.timeout(),
    })?);

    let scheduler = Arc::new(DispatchScheduler::from_config(
        &DispatchSchedulerConfig {
            interval: config.scheduler.interval(),
            batch_size: config.scheduler.batch_size,
        },
        repository.clone(),
        sender,
        cache.clone(),
    ));

    let service = Arc::new(MessageService::new(repository, cache, scheduler.clone()));

    if config.scheduler.auto_start {
        scheduler.start().await;
    }

    let app = api::router(AppState { service });
    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Message relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping dispatch scheduler");
    scheduler.stop().await;
    info!("Message relay shutdown complete");

    Ok(())
}

/// Redis unless dev mode or the memory backend is selected. A Redis that
/// cannot be reached leaves the service running without a cache.
async fn build_cache(config: &AppConfig) -> Option<Arc<dyn SentMessageCache>> {
    let ttl = config.cache.ttl();

    if config.dev_mode || config.cache.backend == CacheBackend::Memory {
        info!(ttl_secs = ttl.as_secs(), "Using in-memory sent-message cache");
        let cache: Arc<dyn SentMessageCache> = Arc::new(InMemorySentMessageCache::new(ttl));
        return Some(cache);
    }

    match RedisSentMessageCache::connect(&config.cache.redis_url, ttl).await {
        Ok(cache) => {
            let cache: Arc<dyn SentMessageCache> = Arc::new(cache);
            Some(cache)
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, listing will be served from the store only");
            None
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
