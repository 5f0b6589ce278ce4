//! Recent-Sent Cache Trait
//!
//! Best-effort index of recently sent messages. Entries expire after the
//! TTL the implementation was built with; a miss only means the reader falls
//! back to the durable store.

use async_trait::async_trait;
use relay_common::SentMessageEntry;

use crate::error::CacheResult;

/// Key prefix shared by every cache backend.
pub const CACHE_KEY_PREFIX: &str = "sent_message:";

/// Cache key for a message id.
pub fn cache_key(message_id: i64) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, message_id)
}

#[async_trait]
pub trait SentMessageCache: Send + Sync {
    /// Upsert an entry keyed by its message id and refresh its expiry.
    async fn put(&self, entry: &SentMessageEntry) -> CacheResult<()>;

    /// Up to `limit` live entries in no particular order.
    ///
    /// Entries that cannot be loaded are skipped.
    async fn list(&self, limit: usize) -> CacheResult<Vec<SentMessageEntry>>;
}
