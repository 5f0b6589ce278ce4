//! SQLite Message Repository Implementation
//!
//! Timestamps are stored as unix milliseconds. Status is stored as text
//! (`PENDING`, `SENT`, `FAILED`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use relay_common::{validate_content, Message, MessageStatus};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::repository::MessageRepository;

const SELECT_COLUMNS: &str =
    r#"id, "to", content, status, external_message_id, sent_at, created_at, updated_at"#;

/// SQLite implementation of MessageRepository
pub struct SqliteMessageRepository {
    pool: SqlitePool,
}

impl SqliteMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn millis_to_datetime(value: i64, column: &str) -> StoreResult<DateTime<Utc>> {
        DateTime::from_timestamp_millis(value)
            .ok_or_else(|| StoreError::CorruptRow(format!("invalid {} timestamp: {}", column, value)))
    }

    fn parse_row(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Message> {
        let status_text: String = row.try_get("status")?;
        let status = MessageStatus::parse(&status_text)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown status: {}", status_text)))?;

        let sent_at = match row.try_get::<Option<i64>, _>("sent_at")? {
            Some(ts) => Some(Self::millis_to_datetime(ts, "sent_at")?),
            None => None,
        };

        Ok(Message {
            id: row.try_get("id")?,
            to: row.try_get("to")?,
            content: row.try_get("content")?,
            status,
            external_message_id: row.try_get("external_message_id")?,
            sent_at,
            created_at: Self::millis_to_datetime(row.try_get("created_at")?, "created_at")?,
            updated_at: Self::millis_to_datetime(row.try_get("updated_at")?, "updated_at")?,
        })
    }

    async fn fetch_by_status(&self, status: MessageStatus, order_by: &str, limit: u32) -> StoreResult<Vec<Message>> {
        let query = format!(
            "SELECT {} FROM messages WHERE status = ? ORDER BY {} LIMIT ?",
            SELECT_COLUMNS, order_by
        );

        let rows = sqlx::query(&query)
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::parse_row).collect()
    }
}

#[async_trait]
impl MessageRepository for SqliteMessageRepository {
    async fn create(&self, to: &str, content: &str) -> StoreResult<Message> {
        validate_content(content)?;

        let now = relay_common::now_millis();
        let now_ms = now.timestamp_millis();

        let result = sqlx::query(
            r#"INSERT INTO messages ("to", content, status, external_message_id, created_at, updated_at)
               VALUES (?, ?, ?, '', ?, ?)"#,
        )
        .bind(to)
        .bind(content)
        .bind(MessageStatus::Pending.as_str())
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(message_id = id, "Message created");

        Ok(Message {
            id,
            to: to.to_string(),
            content: content.to_string(),
            status: MessageStatus::Pending,
            external_message_id: String::new(),
            sent_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    async fn fetch_pending(&self, limit: u32) -> StoreResult<Vec<Message>> {
        let messages = self
            .fetch_by_status(MessageStatus::Pending, "created_at ASC, id ASC", limit)
            .await?;
        debug!(count = messages.len(), "Fetched pending messages");
        Ok(messages)
    }

    async fn fetch_sent(&self, limit: u32) -> StoreResult<Vec<Message>> {
        let messages = self
            .fetch_by_status(MessageStatus::Sent, "sent_at DESC, id DESC", limit)
            .await?;
        debug!(count = messages.len(), "Fetched sent messages");
        Ok(messages)
    }

    async fn update_status(
        &self,
        id: i64,
        status: MessageStatus,
        external_message_id: Option<&str>,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let now_ms = Utc::now().timestamp_millis();

        let result = sqlx::query(
            "UPDATE messages \
             SET status = ?, \
                 external_message_id = COALESCE(?, external_message_id), \
                 sent_at = COALESCE(?, sent_at), \
                 updated_at = ? \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(external_message_id)
        .bind(sent_at.map(|t| t.timestamp_millis()))
        .bind(now_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            warn!(message_id = id, "No message found with given id");
            return Err(StoreError::NotFound(id));
        }

        debug!(message_id = id, status = %status, "Message status updated");
        Ok(())
    }

    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                "to" VARCHAR(20) NOT NULL,
                content VARCHAR(160) NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'PENDING',
                external_message_id VARCHAR(64) NOT NULL DEFAULT '',
                sent_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_status_created_at ON messages(status, created_at)",
        )
        .execute(&self.pool)
        .await?;

        info!("Initialized SQLite message schema");
        Ok(())
    }
}
