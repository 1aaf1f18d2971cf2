//! Chat webhook notifications.

use async_trait::async_trait;
use movienight_common::{AppError, AppResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of retries for webhook delivery.
const MAX_WEBHOOK_RETRIES: u32 = 3;

/// Posts short human-readable messages to a chat channel.
#[async_trait]
pub trait ChatWebhook: Send + Sync {
    /// Post one message.
    async fn post(&self, title: &str, text: &str) -> AppResult<()>;
}

/// Webhook payload for delivery.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    text: &'a str,
}

/// Chat webhook client over HTTP.
#[derive(Clone)]
pub struct WebhookClient {
    url: Option<String>,
    debug: bool,
    max_retries: u32,
    http_client: Arc<reqwest::Client>,
}

impl WebhookClient {
    /// Create a webhook client. With no URL every post is skipped; in debug
    /// mode posts are logged instead of sent.
    pub fn new(url: Option<String>, debug: bool) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("MovieNight-Webhook/1.0")
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            url,
            debug,
            max_retries: MAX_WEBHOOK_RETRIES,
            http_client: Arc::new(http_client),
        })
    }

    /// Override the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Deliver a webhook payload with retry logic.
    async fn deliver_with_retry(&self, url: &str, payload: &WebhookPayload<'_>) -> AppResult<()> {
        let mut retry_count = 0;
        loop {
            match self.deliver_once(url, payload).await {
                Ok(()) => {
                    tracing::debug!(title = payload.title, "Webhook delivered successfully");
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;

                    if retry_count > self.max_retries {
                        return Err(e);
                    }

                    // Calculate backoff delay: 2^retry_count seconds (2, 4, 8...)
                    let delay_secs = 2u64.pow(retry_count);
                    tracing::debug!(
                        retry_count = retry_count,
                        delay_secs = delay_secs,
                        error = %e,
                        "Webhook delivery failed, retrying"
                    );

                    tokio::time::sleep(Duration::from_secs(delay_secs)).await;
                }
            }
        }
    }

    /// Attempt a single webhook delivery.
    async fn deliver_once(&self, url: &str, payload: &WebhookPayload<'_>) -> AppResult<()> {
        let response = self
            .http_client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Request failed: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::ExternalService(format!(
                "HTTP {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl ChatWebhook for WebhookClient {
    async fn post(&self, title: &str, text: &str) -> AppResult<()> {
        if self.debug {
            tracing::info!(title, text, "Debug mode, chat webhook not sent");
            return Ok(());
        }

        let Some(url) = self.url.as_deref() else {
            tracing::debug!(title, "No chat webhook configured");
            return Ok(());
        };

        self.deliver_with_retry(url, &WebhookPayload { title, text })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debug_mode_skips_delivery() {
        let client = WebhookClient::new(Some("http://127.0.0.1:9/hook".to_string()), true).unwrap();
        assert!(client.post("Movie-Night: RSVP", "Alice: ACCEPTED").await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_url_skips_delivery() {
        let client = WebhookClient::new(None, false).unwrap();
        assert!(client.post("Movie-Night: RSVP", "Alice: ACCEPTED").await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_external_error() {
        let client = WebhookClient::new(Some("http://127.0.0.1:9/hook".to_string()), false)
            .unwrap()
            .with_max_retries(0);

        let result = client.post("Movie-Night: RSVP", "Alice: ACCEPTED").await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            title: "Movie-Night: New Votes!",
            text: "Alice voted",
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "title": "Movie-Night: New Votes!", "text": "Alice voted" })
        );
    }
}
