//! SMS notifier via a generic HTTP gateway.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

#[derive(Deserialize)]
struct GatewayResponse {
    /// Gateway-assigned message id, when provided.
    #[serde(default)]
    message_id: Option<String>,
}

pub struct SmsNotifier {
    gateway_url: String,
    client: reqwest::Client,
}

impl SmsNotifier {
    pub fn new(gateway_url: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self {
            gateway_url,
            client,
        })
    }
}

#[async_trait]
impl Notifier for SmsNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        // SMS has no subject line; lead with it instead.
        let text = format!("{}: {}", notification.subject, notification.content);
        let payload = serde_json::json!({
            "to": notification.recipient,
            "message": text,
        });

        let response = self
            .client
            .post(&self.gateway_url)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(NotifyError::Rejected(format!("sms gateway {status}")));
        }

        let external_id = response
            .json::<GatewayResponse>()
            .await
            .ok()
            .and_then(|r| r.message_id)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(ProviderReceipt::sent(external_id))
    }

    fn channel(&self) -> Channel {
        Channel::Sms
    }
}
