//! Notification records and delivery status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::Priority;

// ── Channel ─────────────────────────────────────────────────────────

/// Delivery channels the dispatcher can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Slack,
    Teams,
    Webhook,
    Pagerduty,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Slack => "slack",
            Channel::Teams => "teams",
            Channel::Webhook => "webhook",
            Channel::Pagerduty => "pagerduty",
        }
    }

    pub const ALL: [Channel; 6] = [
        Channel::Email,
        Channel::Sms,
        Channel::Slack,
        Channel::Teams,
        Channel::Webhook,
        Channel::Pagerduty,
    ];
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "slack" => Ok(Channel::Slack),
            "teams" => Ok(Channel::Teams),
            "webhook" => Ok(Channel::Webhook),
            "pagerduty" => Ok(Channel::Pagerduty),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Status ──────────────────────────────────────────────────────────

/// Delivery status. `Delivered` and `Failed` are terminal and never revert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Retry,
    Sent,
    Delivered,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Retry => "retry",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NotificationStatus::Delivered | NotificationStatus::Failed)
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "retry" => Ok(NotificationStatus::Retry),
            "sent" => Ok(NotificationStatus::Sent),
            "delivered" => Ok(NotificationStatus::Delivered),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(format!("unknown notification status: {other}")),
        }
    }
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Notification ────────────────────────────────────────────────────

/// A single queued or delivered notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub alert_id: Uuid,
    #[serde(default)]
    pub rule_id: Option<Uuid>,
    pub channel: Channel,
    pub recipient: String,
    pub subject: String,
    /// Rendered body, ready for the provider.
    pub content: String,
    pub priority: Priority,
    pub status: NotificationStatus,
    /// Earliest time the dispatcher may attempt delivery.
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    #[serde(default)]
    pub last_error: Option<String>,
    /// Provider-returned message id; presence marks the send as done.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub tracking_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Whether another delivery attempt is allowed.
    pub fn can_retry(&self) -> bool {
        !self.status.is_terminal() && self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(NotificationStatus::Delivered.is_terminal());
        assert!(NotificationStatus::Failed.is_terminal());
        assert!(!NotificationStatus::Retry.is_terminal());
    }

    #[test]
    fn channel_round_trips() {
        for ch in Channel::ALL {
            assert_eq!(ch.as_str().parse::<Channel>().unwrap(), ch);
        }
    }
}
