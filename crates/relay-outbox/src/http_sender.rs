//! HTTP Webhook Sender
//!
//! Delivers one message per request as `POST {"to", "content"}` with the
//! `x-ins-auth-key` header. Only `202 Accepted` counts as delivered.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::SendError;
use crate::MessageSender;

/// Header carrying the webhook auth key.
pub const AUTH_HEADER: &str = "x-ins-auth-key";

/// HTTP sender configuration
#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    /// Webhook endpoint
    pub url: String,
    pub auth_key: String,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000/webhook".to_string(),
            auth_key: String::new(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    to: &'a str,
    content: &'a str,
}

/// Body of an accepted webhook call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    #[serde(default)]
    pub message: String,
    pub message_id: String,
}

pub struct HttpMessageSender {
    config: HttpSenderConfig,
    client: reqwest::Client,
}

impl HttpMessageSender {
    pub fn new(config: HttpSenderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpSenderConfig {
        &self.config
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(&self, to: &str, content: &str) -> Result<WebhookResponse, SendError> {
        debug!(url = %self.config.url, to, "Sending message to webhook");

        let response = self
            .client
            .post(&self.config.url)
            .header(AUTH_HEADER, &self.config.auth_key)
            .json(&WebhookRequest { to, content })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Webhook request failed");
                SendError::from(e)
            })?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Webhook rejected message");
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        let parsed: WebhookResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::MalformedResponse(format!("{}: {}", e, body)))?;

        if parsed.message_id.is_empty() {
            return Err(SendError::MalformedResponse("empty messageId".to_string()));
        }

        debug!(external_message_id = %parsed.message_id, "Webhook accepted message");
        Ok(parsed)
    }
}
