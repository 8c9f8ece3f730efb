//! Notification delivery collaborator.
//!
//! Delivery failures are logged by callers, never fatal to a run.

use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;
use uuid::Uuid;

/// Sends scan summaries to configured recipients.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    /// Deliver `body` to `recipients`, returning a delivery id.
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<String>;
}

/// POSTs notification payloads to a webhook relay (mail gateway, chat
/// bridge, whatever is configured downstream).
pub struct WebhookSender {
    client: Client,
    endpoint: String,
}

impl WebhookSender {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<String> {
        let delivery_id = Uuid::new_v4().to_string();
        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "deliveryId": delivery_id,
                "recipients": recipients,
                "subject": subject,
                "body": body,
            }))
            .send()
            .await
            .context("Webhook request failed")?
            .error_for_status()
            .context("Webhook rejected notification")?;
        Ok(delivery_id)
    }
}

/// Logs instead of delivering. Used when no webhook is configured, and in
/// tests.
#[derive(Default)]
pub struct NoopSender;

#[async_trait::async_trait]
impl NotificationSender for NoopSender {
    async fn send(&self, recipients: &[String], subject: &str, _body: &str) -> Result<String> {
        tracing::info!(count = recipients.len(), %subject, "Notification delivery skipped (no sender configured)");
        Ok(Uuid::new_v4().to_string())
    }
}
