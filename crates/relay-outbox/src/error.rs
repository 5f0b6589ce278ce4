use relay_common::ValidationError;
use thiserror::Error;

/// Errors raised by a [`MessageRepository`](crate::MessageRepository).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Message not found: {0}")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt message row: {0}")]
    CorruptRow(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Errors raised by a [`SentMessageCache`](crate::SentMessageCache).
///
/// Never fatal: callers log and fall back to the store.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Redis(e.to_string())
    }
}

/// Errors raised by a [`MessageSender`](crate::MessageSender).
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Webhook unreachable: {0}")]
    Unreachable(String),

    #[error("Malformed webhook response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for SendError {
    fn from(e: reqwest::Error) -> Self {
        SendError::Unreachable(e.to_string())
    }
}

/// Errors surfaced by the [`MessageService`](crate::MessageService).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => ServiceError::Validation(v),
            other => ServiceError::Store(other),
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type CacheResult<T> = std::result::Result<T, CacheError>;
