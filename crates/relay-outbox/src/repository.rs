//! Message Repository Trait
//!
//! Persistence interface for the durable message store. The store is the
//! single source of truth for message status; the cache only mirrors it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_common::{Message, MessageStatus};

use crate::error::StoreResult;

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a new PENDING message.
    ///
    /// Content longer than 160 characters is rejected before anything is written.
    async fn create(&self, to: &str, content: &str) -> StoreResult<Message>;

    /// Up to `limit` PENDING messages, oldest first.
    async fn fetch_pending(&self, limit: u32) -> StoreResult<Vec<Message>>;

    /// Up to `limit` SENT messages, most recently sent first.
    async fn fetch_sent(&self, limit: u32) -> StoreResult<Vec<Message>>;

    /// Set `status` and, when given, the external id and send time.
    ///
    /// Fails with `StoreError::NotFound` when no message has this id.
    async fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        external_message_id: Option<&str>,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Create tables and indexes if they do not exist.
    async fn init_schema(&self) -> StoreResult<()>;

    async fn mark_sent(&self, id: i64, external_message_id: &str, sent_at: DateTime<Utc>) -> StoreResult<()> {
        self.update_status(id, MessageStatus::Sent, Some(external_message_id), Some(sent_at))
            .await
    }
}
