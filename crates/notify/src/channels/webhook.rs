//! Generic HTTP webhook notifier.
//!
//! The notification's `recipient` is the target URL and its `content`
//! the pre-merged JSON payload (rule overrides already applied by the
//! action dispatcher).

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        let url = &notification.recipient;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(NotifyError::Rejected(format!("bad webhook url '{url}'")));
        }

        // Content is JSON when the dispatcher built a webhook payload;
        // fall back to a plain wrapper for hand-written notifications.
        let body: serde_json::Value = serde_json::from_str(&notification.content)
            .unwrap_or_else(|_| {
                serde_json::json!({
                    "subject": notification.subject,
                    "message": notification.content,
                })
            });

        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(NotifyError::Rejected(format!("webhook returned {status}")));
        }

        Ok(ProviderReceipt::delivered(Uuid::new_v4().to_string()))
    }

    fn channel(&self) -> Channel {
        Channel::Webhook
    }
}
