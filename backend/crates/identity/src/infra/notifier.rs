//! Notification transports
//!
//! [`LogTransport`] writes notifications to the log (development, tests).
//! [`WebhookTransport`] POSTs them as JSON to a relay that owns templating
//! and mail delivery.

use std::time::Duration;

use crate::application::notification::{Notification, NotificationError, NotificationTransport};

/// Backoff between attempts; one attempt more than there are delays
const RETRY_DELAYS_SECS: [u64; 2] = [1, 2];

/// HTTP request timeout for a single delivery attempt
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct LogTransport;

impl NotificationTransport for LogTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            kind = notification.kind(),
            to = notification.recipient(),
            "Notification (log transport)"
        );
        // Full payload includes one-time links; debug only
        match serde_json::to_string(notification) {
            Ok(payload) => tracing::debug!(%payload, "Notification payload"),
            Err(e) => tracing::warn!(error = %e, "Notification payload not serializable"),
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
}

impl WebhookTransport {
    pub fn new(url: impl Into<String>) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::Delivery(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn try_send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::Delivery(format!(
                "webhook returned HTTP {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}

impl NotificationTransport for WebhookTransport {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(notification).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        kind = notification.kind(),
                        error = %e,
                        "Webhook delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }
        self.try_send(notification).await
    }
}
