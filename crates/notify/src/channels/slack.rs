//! Slack incoming-webhook notifier.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

pub struct SlackNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl SlackNotifier {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self {
            webhook_url,
            client,
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        // The recipient carries the target channel (e.g. "#alerts").
        let payload = serde_json::json!({
            "channel": notification.recipient,
            "text": format!("*{}*\n{}", notification.subject, notification.content),
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("slack {status}: {body}")));
        }

        // Incoming webhooks return a bare "ok"; synthesize a receipt id.
        Ok(ProviderReceipt::delivered(Uuid::new_v4().to_string()))
    }

    fn channel(&self) -> Channel {
        Channel::Slack
    }
}
