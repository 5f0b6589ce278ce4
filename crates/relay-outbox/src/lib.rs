//! Message Relay Outbox
//!
//! Durable message store, recent-sent cache, webhook sender and the
//! dispatch scheduler that moves messages from PENDING to SENT:
//!
//! - [`MessageRepository`]: authoritative message store (SQLite)
//! - [`SentMessageCache`]: TTL-bounded index of recently sent messages (Redis or in-memory)
//! - [`MessageSender`]: webhook transport
//! - [`DispatchScheduler`]: background loop dispatching PENDING batches
//! - [`MessageService`]: cache-augmented listing and scheduler control

use async_trait::async_trait;

pub mod cache;
pub mod error;
pub mod http_sender;
pub mod memory_cache;
pub mod repository;
pub mod scheduler;
pub mod service;

#[cfg(feature = "redis")]
pub mod redis_cache;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{cache_key, SentMessageCache, CACHE_KEY_PREFIX};
pub use error::{CacheError, CacheResult, SendError, ServiceError, StoreError, StoreResult};
pub use http_sender::{HttpMessageSender, HttpSenderConfig, WebhookResponse, AUTH_HEADER};
pub use memory_cache::InMemorySentMessageCache;
pub use repository::MessageRepository;
pub use scheduler::{DispatchScheduler, DispatchSchedulerConfig, OutboxDispatcher, SchedulerState, TickSummary};
pub use service::MessageService;

#[cfg(feature = "redis")]
pub use redis_cache::RedisSentMessageCache;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteMessageRepository;

/// Delivers a single message to the external channel.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// One delivery attempt. No retries.
    async fn send(&self, to: &str, content: &str) -> Result<WebhookResponse, SendError>;
}
