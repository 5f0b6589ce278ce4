use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod logging;

/// Maximum number of characters a message body may carry.
pub const MAX_CONTENT_LENGTH: usize = 160;

/// Upper bound for the sent-message listing `limit`.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Default `limit` when the caller gives none.
pub const DEFAULT_LIST_LIMIT: usize = 10;

/// Display format used for `sent_at` in API responses.
pub const SENT_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Message Types
// ============================================================================

/// Lifecycle status of a message. Stored as text in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Waiting to be dispatched
    Pending,
    /// Accepted by the webhook
    Sent,
    /// Defined for schema compatibility; the scheduler never sets it
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Pending => "PENDING",
            MessageStatus::Sent => "SENT",
            MessageStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(MessageStatus::Pending),
            "SENT" => Some(MessageStatus::Sent),
            "FAILED" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

impl Default for MessageStatus {
    fn default() -> Self {
        MessageStatus::Pending
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as recorded in the durable store.
///
/// `external_message_id` is empty and `sent_at` is `None` unless the status
/// is [`MessageStatus::Sent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub to: String,
    pub content: String,
    pub status: MessageStatus,
    pub external_message_id: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cache projection of a message taken at the moment it was sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageEntry {
    pub message_id: i64,
    pub external_message_id: String,
    pub to: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

impl SentMessageEntry {
    /// Build the cache entry for a message that was just accepted.
    pub fn from_sent(message: &Message, external_message_id: &str, sent_at: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id,
            external_message_id: external_message_id.to_string(),
            to: message.to.clone(),
            content: message.content.clone(),
            sent_at,
        }
    }
}

/// A sent message as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageView {
    pub message_id: i64,
    pub external_message_id: String,
    pub to: String,
    pub content: String,
    pub sent_at: String,
}

impl From<&SentMessageEntry> for MessageView {
    fn from(entry: &SentMessageEntry) -> Self {
        Self {
            message_id: entry.message_id,
            external_message_id: entry.external_message_id.clone(),
            to: entry.to.clone(),
            content: entry.content.clone(),
            sent_at: format_sent_at(entry.sent_at),
        }
    }
}

pub fn format_sent_at(sent_at: DateTime<Utc>) -> String {
    sent_at.format(SENT_AT_FORMAT).to_string()
}

/// Current time truncated to milliseconds, the resolution the store keeps.
pub fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

// ============================================================================
// Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("content exceeds {max} character limit (got {actual})")]
    ContentTooLong { max: usize, actual: usize },

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("limit must be between 1 and {max} (got {actual})")]
    LimitOutOfRange { max: usize, actual: i64 },
}

/// Reject content longer than [`MAX_CONTENT_LENGTH`] characters.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    let actual = content.chars().count();
    if actual > MAX_CONTENT_LENGTH {
        return Err(ValidationError::ContentTooLong {
            max: MAX_CONTENT_LENGTH,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_round_trip_through_text() {
        for status in [MessageStatus::Pending, MessageStatus::Sent, MessageStatus::Failed] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MessageStatus::parse("sent"), Some(MessageStatus::Sent));
        assert_eq!(MessageStatus::parse("DELIVERED"), None);
    }

    #[test]
    fn test_status_serializes_screaming_case() {
        let json = serde_json::to_string(&MessageStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
    }

    #[test]
    fn test_validate_content_boundary() {
        assert!(validate_content(&"a".repeat(160)).is_ok());
        assert_eq!(
            validate_content(&"a".repeat(161)),
            Err(ValidationError::ContentTooLong { max: 160, actual: 161 })
        );
    }

    #[test]
    fn test_validate_content_counts_characters_not_bytes() {
        // 160 two-byte characters
        let content = "é".repeat(160);
        assert_eq!(content.len(), 320);
        assert!(validate_content(&content).is_ok());
    }

    #[test]
    fn test_message_view_formats_sent_at() {
        let entry = SentMessageEntry {
            message_id: 7,
            external_message_id: "ext-7".to_string(),
            to: "+905551234567".to_string(),
            content: "hello".to_string(),
            sent_at: Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 1).unwrap(),
        };

        let view = MessageView::from(&entry);
        assert_eq!(view.message_id, 7);
        assert_eq!(view.sent_at, "2024-03-09 14:05:01");
    }
}
