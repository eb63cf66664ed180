//! Store-backed implementations of the seams other crates define.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use vigil_core::notification::{Channel, Notification};
use vigil_core::rule::Rule;
use vigil_core::VigilError;
use vigil_notify::NotificationQueue;
use vigil_rules::{RuleSource, RulesError};
use vigil_store::{NotificationRepo, RuleRepo};

/// [`RuleSource`] over the rule repo, feeding the compiled cache.
pub struct StoreRuleSource {
    rules: RuleRepo,
}

impl StoreRuleSource {
    pub fn new(rules: RuleRepo) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StoreRuleSource {
    async fn list_enabled(&self) -> Result<Vec<Rule>, RulesError> {
        self.rules
            .list_enabled()
            .await
            .map_err(|e| RulesError::Source(e.to_string()))
    }
}

/// [`NotificationQueue`] over the notification repo, feeding the
/// per-channel dispatch workers.
pub struct StoreNotificationQueue {
    notifications: NotificationRepo,
}

impl StoreNotificationQueue {
    pub fn new(notifications: NotificationRepo) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl NotificationQueue for StoreNotificationQueue {
    async fn next_batch_due(
        &self,
        channel: Channel,
        limit: i64,
    ) -> Result<Vec<Notification>, VigilError> {
        Ok(self.notifications.next_batch_due(channel, limit).await?)
    }

    async fn mark_sent(&self, id: Uuid, external_id: &str) -> Result<Notification, VigilError> {
        Ok(self.notifications.mark_sent(id, external_id).await?)
    }

    async fn mark_delivered(&self, id: Uuid) -> Result<Notification, VigilError> {
        Ok(self.notifications.mark_delivered(id).await?)
    }

    async fn mark_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Notification, VigilError> {
        Ok(self
            .notifications
            .mark_retry(id, error, next_attempt_at)
            .await?)
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Notification, VigilError> {
        Ok(self.notifications.mark_failed(id, error).await?)
    }
}
