//! In-process Recent-Sent Cache
//!
//! Used in dev mode and tests. Expired entries are hidden from `list` and
//! purged on the next `put` or `list`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use relay_common::SentMessageEntry;
use tracing::debug;

use crate::cache::SentMessageCache;
use crate::error::CacheResult;

struct CachedEntry {
    entry: SentMessageEntry,
    expires_at: Instant,
}

pub struct InMemorySentMessageCache {
    entries: DashMap<i64, CachedEntry>,
    ttl: Duration,
}

impl InMemorySentMessageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Number of entries held, including ones that expired but were not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, cached| cached.expires_at > now);
    }
}

#[async_trait]
impl SentMessageCache for InMemorySentMessageCache {
    async fn put(&self, entry: &SentMessageEntry) -> CacheResult<()> {
        // Keeps the map bounded when nothing reads from it
        self.purge_expired();
        self.entries.insert(
            entry.message_id,
            CachedEntry {
                entry: entry.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        debug!(message_id = entry.message_id, "Cached sent message in memory");
        Ok(())
    }

    async fn list(&self, limit: usize) -> CacheResult<Vec<SentMessageEntry>> {
        let now = Instant::now();
        let mut expired = false;

        let entries: Vec<SentMessageEntry> = self
            .entries
            .iter()
            .filter(|cached| {
                let live = cached.expires_at > now;
                expired |= !live;
                live
            })
            .take(limit)
            .map(|cached| cached.entry.clone())
            .collect();

        if expired {
            self.purge_expired();
        }

        Ok(entries)
    }
}
