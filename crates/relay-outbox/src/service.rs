//! Message Service
//!
//! Single entry point for the HTTP layer: message creation, scheduler
//! control and the cache-augmented listing of sent messages.

use std::collections::HashSet;
use std::sync::Arc;

use relay_common::{Message, MessageView, SentMessageEntry, ValidationError, MAX_LIST_LIMIT};
use tracing::{debug, error, warn};

use crate::error::ServiceError;
use crate::scheduler::{DispatchScheduler, SchedulerState};
use crate::{MessageRepository, SentMessageCache};

pub struct MessageService {
    repository: Arc<dyn MessageRepository>,
    cache: Option<Arc<dyn SentMessageCache>>,
    scheduler: Arc<DispatchScheduler>,
}

impl MessageService {
    pub fn new(
        repository: Arc<dyn MessageRepository>,
        cache: Option<Arc<dyn SentMessageCache>>,
        scheduler: Arc<DispatchScheduler>,
    ) -> Self {
        Self {
            repository,
            cache,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<DispatchScheduler> {
        &self.scheduler
    }

    /// Queue a new message for dispatch.
    pub async fn create_message(&self, to: &str, content: &str) -> Result<Message, ServiceError> {
        if to.trim().is_empty() {
            return Err(ValidationError::Empty("to").into());
        }
        if content.is_empty() {
            return Err(ValidationError::Empty("content").into());
        }

        Ok(self.repository.create(to, content).await?)
    }

    pub async fn start_scheduler(&self) -> SchedulerState {
        self.scheduler.start().await;
        self.scheduler.state().await
    }

    pub async fn stop_scheduler(&self) -> SchedulerState {
        self.scheduler.stop().await;
        self.scheduler.state().await
    }

    pub async fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state().await
    }

    /// Up to `limit` most recently sent messages, newest first.
    ///
    /// Cached entries are used first and the store fills the remainder. A
    /// failing cache degrades to store-only results; a failing store still
    /// returns whatever the cache had. Errors only when both yield nothing.
    pub async fn list_sent(&self, limit: usize) -> Result<Vec<MessageView>, ServiceError> {
        if limit == 0 || limit > MAX_LIST_LIMIT {
            return Err(ValidationError::LimitOutOfRange {
                max: MAX_LIST_LIMIT,
                actual: limit as i64,
            }
            .into());
        }

        let mut entries = self.cached_entries(limit).await;

        // A cache scan may yield the same key twice
        let mut seen: HashSet<i64> = HashSet::with_capacity(entries.len());
        entries.retain(|e| seen.insert(e.message_id));

        if entries.len() >= limit {
            debug!(count = entries.len(), "Serving sent messages from cache");
            return Ok(finish(entries, limit));
        }

        let remaining = limit - entries.len();
        let fetch_limit = u32::try_from(remaining).unwrap_or(u32::MAX);

        let stored = match self.repository.fetch_sent(fetch_limit).await {
            Ok(stored) => stored,
            Err(e) if !entries.is_empty() => {
                warn!(error = %e, cached = entries.len(), "Store query failed, serving cached results only");
                return Ok(finish(entries, limit));
            }
            Err(e) => {
                error!(error = %e, "Failed to list sent messages");
                return Err(e.into());
            }
        };

        for message in &stored {
            if entries.len() >= limit {
                break;
            }
            if !seen.insert(message.id) {
                continue;
            }
            let Some(sent_at) = message.sent_at else {
                warn!(message_id = message.id, "Sent message has no sent_at, skipping");
                continue;
            };
            entries.push(SentMessageEntry::from_sent(message, &message.external_message_id, sent_at));
        }

        Ok(finish(entries, limit))
    }

    async fn cached_entries(&self, limit: usize) -> Vec<SentMessageEntry> {
        let Some(cache) = &self.cache else {
            return Vec::new();
        };

        match cache.list(limit).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read sent messages from cache, falling back to store");
                Vec::new()
            }
        }
    }
}

/// Sort newest first (ties by id, descending), truncate and project.
fn finish(mut entries: Vec<SentMessageEntry>, limit: usize) -> Vec<MessageView> {
    entries.sort_by(|a, b| {
        b.sent_at
            .cmp(&a.sent_at)
            .then_with(|| b.message_id.cmp(&a.message_id))
    });
    entries.truncate(limit);
    entries.iter().map(MessageView::from).collect()
}
