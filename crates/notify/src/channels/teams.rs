//! Microsoft Teams incoming-webhook notifier (MessageCard format).

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

pub struct TeamsNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl TeamsNotifier {
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
impl Notifier for TeamsNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        let payload = serde_json::json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "summary": notification.subject,
            "title": notification.subject,
            "text": notification.content,
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
            return Err(NotifyError::Rejected(format!("teams {status}: {body}")));
        }

        Ok(ProviderReceipt::delivered(Uuid::new_v4().to_string()))
    }

    fn channel(&self) -> Channel {
        Channel::Teams
    }
}
