//! PagerDuty Events API v2 notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};
use vigil_core::rule::Priority;

use crate::traits::{Notifier, NotifyError, ProviderReceipt};

const EVENTS_URL: &str = "https://events.pagerduty.com/v2/enqueue";

#[derive(Deserialize)]
struct EnqueueResponse {
    #[serde(default)]
    dedup_key: Option<String>,
}

pub struct PagerdutyNotifier {
    routing_key: String,
    client: reqwest::Client,
}

impl PagerdutyNotifier {
    pub fn new(routing_key: String, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NotifyError::Http)?;
        Ok(Self {
            routing_key,
            client,
        })
    }
}

fn pd_severity(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "critical",
        Priority::High => "error",
        Priority::Medium => "warning",
        Priority::Low => "info",
    }
}

#[async_trait]
impl Notifier for PagerdutyNotifier {
    async fn send(&self, notification: &Notification) -> Result<ProviderReceipt, NotifyError> {
        let payload = serde_json::json!({
            "routing_key": self.routing_key,
            "event_action": "trigger",
            "dedup_key": notification.tracking_id,
            "payload": {
                "summary": notification.subject,
                "source": notification.recipient,
                "severity": pd_severity(notification.priority),
                "custom_details": { "body": notification.content },
            },
        });

        let response = self.client.post(EVENTS_URL).json(&payload).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!("pagerduty {status}: {body}")));
        }

        let dedup_key = response
            .json::<EnqueueResponse>()
            .await
            .ok()
            .and_then(|r| r.dedup_key)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(ProviderReceipt::sent(dedup_key))
    }

    fn channel(&self) -> Channel {
        Channel::Pagerduty
    }
}
