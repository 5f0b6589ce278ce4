//! Redis-backed Recent-Sent Cache
//!
//! Each entry is a JSON value under `sent_message:<id>` written with
//! `SET ... EX ttl`. Listing walks the keyspace with `SCAN MATCH` and loads
//! each key with `GET`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use relay_common::SentMessageEntry;
use tracing::{debug, info, warn};

use crate::cache::{cache_key, SentMessageCache, CACHE_KEY_PREFIX};
use crate::error::{CacheError, CacheResult};

pub struct RedisSentMessageCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisSentMessageCache {
    pub fn new(conn: ConnectionManager, ttl: Duration) -> Self {
        Self { conn, ttl }
    }

    /// Open a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str, ttl: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        let conn = ConnectionManager::new(client).await?;

        info!(ttl_secs = ttl.as_secs(), "Connected to Redis sent-message cache");
        Ok(Self::new(conn, ttl))
    }

    fn ttl_secs(&self) -> u64 {
        // EX 0 is rejected by Redis
        self.ttl.as_secs().max(1)
    }
}

#[async_trait]
impl SentMessageCache for RedisSentMessageCache {
    async fn put(&self, entry: &SentMessageEntry) -> CacheResult<()> {
        let key = cache_key(entry.message_id);
        let payload = serde_json::to_string(entry)?;
        let mut conn = self.conn.clone();

        redis::cmd("SET")
            .arg(&key)
            .arg(payload)
            .arg("EX")
            .arg(self.ttl_secs())
            .query_async::<()>(&mut conn)
            .await?;

        debug!(
            message_id = entry.message_id,
            external_message_id = %entry.external_message_id,
            "Cached sent message"
        );
        Ok(())
    }

    async fn list(&self, limit: usize) -> CacheResult<Vec<SentMessageEntry>> {
        let mut entries = Vec::new();
        if limit == 0 {
            return Ok(entries);
        }

        let mut conn = self.conn.clone();
        let pattern = format!("{}*", CACHE_KEY_PREFIX);
        let mut cursor: u64 = 0;
        // SCAN may return a key more than once
        let mut seen_keys: HashSet<String> = HashSet::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(limit)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                if entries.len() >= limit {
                    break;
                }
                if !seen_keys.insert(key.clone()) {
                    continue;
                }

                let raw = match redis::cmd("GET")
                    .arg(&key)
                    .query_async::<Option<String>>(&mut conn)
                    .await
                {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(key = %key, error = %e, "Failed to load cached message, skipping");
                        continue;
                    }
                };

                if let Some(entry) = decode_entry(&key, raw) {
                    entries.push(entry);
                }
            }

            cursor = next_cursor;
            if cursor == 0 || entries.len() >= limit {
                break;
            }
        }

        debug!(count = entries.len(), "Retrieved cached sent messages");
        Ok(entries)
    }
}

/// Decode the value loaded for `key`. `None` when the key expired between
/// SCAN and GET or the value is not a valid entry.
fn decode_entry(key: &str, raw: Option<String>) -> Option<SentMessageEntry> {
    let raw = raw?;
    match serde_json::from_str::<SentMessageEntry>(&raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to decode cached message, skipping");
            None
        }
    }
}
