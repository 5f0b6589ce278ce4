//! Test doubles shared by the unit tests of this crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_common::{validate_content, Message, MessageStatus, SentMessageEntry};

use crate::error::{CacheError, CacheResult, SendError, StoreError, StoreResult};
use crate::{MessageRepository, MessageSender, SentMessageCache, WebhookResponse};

/// Vec-backed repository with switchable failures.
#[derive(Default)]
pub struct InMemoryRepository {
    messages: Mutex<Vec<Message>>,
    pub fail_fetch_pending: AtomicBool,
    pub fail_fetch_sent: AtomicBool,
    pub fail_update: AtomicBool,
    pub fetch_sent_calls: AtomicUsize,
    pub fetch_sent_limits: Mutex<Vec<u32>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&self, to: &str, content: &str) -> Message {
        let mut messages = self.messages.lock().unwrap();
        let now = Utc::now();
        let msg = Message {
            id: messages.len() as i64 + 1,
            to: to.to_string(),
            content: content.to_string(),
            status: MessageStatus::Pending,
            external_message_id: String::new(),
            sent_at: None,
            created_at: now,
            updated_at: now,
        };
        messages.push(msg.clone());
        msg
    }

    /// Insert a SENT message with an explicit id and send time.
    pub fn insert_sent(&self, id: i64, sent_at: DateTime<Utc>) {
        let mut messages = self.messages.lock().unwrap();
        messages.push(Message {
            id,
            to: format!("+90555000{:04}", id),
            content: format!("message {}", id),
            status: MessageStatus::Sent,
            external_message_id: format!("ext-{}", id),
            sent_at: Some(sent_at),
            created_at: sent_at,
            updated_at: sent_at,
        });
    }

    pub fn get(&self, id: i64) -> Option<Message> {
        self.messages.lock().unwrap().iter().find(|m| m.id == id).cloned()
    }

    pub fn set_fail_fetch_sent(&self, fail: bool) {
        self.fail_fetch_sent.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageRepository for InMemoryRepository {
    async fn create(&self, to: &str, content: &str) -> StoreResult<Message> {
        validate_content(content)?;
        Ok(self.insert_pending(to, content))
    }

    async fn fetch_pending(&self, limit: u32) -> StoreResult<Vec<Message>> {
        if self.fail_fetch_pending.load(Ordering::SeqCst) {
            return Err(StoreError::Database("pending query failed".to_string()));
        }
        let mut pending: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.status == MessageStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn fetch_sent(&self, limit: u32) -> StoreResult<Vec<Message>> {
        self.fetch_sent_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_sent_limits.lock().unwrap().push(limit);
        if self.fail_fetch_sent.load(Ordering::SeqCst) {
            return Err(StoreError::Database("sent query failed".to_string()));
        }
        let mut sent: Vec<Message> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.status == MessageStatus::Sent)
            .cloned()
            .collect();
        sent.sort_by(|a, b| b.sent_at.cmp(&a.sent_at).then(b.id.cmp(&a.id)));
        sent.truncate(limit as usize);
        Ok(sent)
    }

    async fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        external_message_id: Option<&str>,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StoreError::Database("update failed".to_string()));
        }
        let mut messages = self.messages.lock().unwrap();
        let msg = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::NotFound(id))?;
        msg.status = status;
        if let Some(ext) = external_message_id {
            msg.external_message_id = ext.to_string();
        }
        if sent_at.is_some() {
            msg.sent_at = sent_at;
        }
        msg.updated_at = Utc::now();
        Ok(())
    }

    async fn init_schema(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Sender that records every call and fails for selected contents.
#[derive(Default)]
pub struct RecordingSender {
    pub calls: Mutex<Vec<(String, String)>>,
    failing_contents: Mutex<HashSet<String>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, content: &str) {
        self.failing_contents.lock().unwrap().insert(content.to_string());
    }

    pub fn recover(&self, content: &str) {
        self.failing_contents.lock().unwrap().remove(content);
    }

    pub fn sent_contents(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, content: &str) -> Result<WebhookResponse, SendError> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((to.to_string(), content.to_string()));
            calls.len()
        };
        if self.failing_contents.lock().unwrap().contains(content) {
            return Err(SendError::Rejected {
                status: 500,
                body: "boom".to_string(),
            });
        }
        Ok(WebhookResponse {
            message: "Accepted".to_string(),
            message_id: format!("ext-call-{}", call_no),
        })
    }
}

/// Cache that fails every operation.
pub struct FailingCache;

#[async_trait]
impl SentMessageCache for FailingCache {
    async fn put(&self, _entry: &SentMessageEntry) -> CacheResult<()> {
        Err(CacheError::Unavailable("cache down".to_string()))
    }

    async fn list(&self, _limit: usize) -> CacheResult<Vec<SentMessageEntry>> {
        Err(CacheError::Unavailable("cache down".to_string()))
    }
}

/// Cache that always lists the same entries, repeats included.
pub struct FixedCache {
    entries: Vec<SentMessageEntry>,
}

impl FixedCache {
    pub fn new(entries: Vec<SentMessageEntry>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl SentMessageCache for FixedCache {
    async fn put(&self, _entry: &SentMessageEntry) -> CacheResult<()> {
        Ok(())
    }

    async fn list(&self, limit: usize) -> CacheResult<Vec<SentMessageEntry>> {
        Ok(self.entries.iter().take(limit).cloned().collect())
    }
}
