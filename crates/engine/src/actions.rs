//! Action dispatch: translate matched rules into alert, notification,
//! webhook, and escalation effects.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use vigil_bus::EventRef;
use vigil_core::alert::Alert;
use vigil_core::config::ChannelsConfig;
use vigil_core::event::Event;
use vigil_core::notification::{Channel, Notification, NotificationStatus};
use vigil_core::rule::{ActionSpec, Severity};
use vigil_core::VigilError;
use vigil_notify::{NotificationContext, TemplateRenderer};
use vigil_rules::{EvaluationResult, ThrottleDecision, ThrottleMap};
use vigil_store::{NotificationRepo, PolicyRepo};

use crate::lifecycle::{AlertDraft, LifecycleManager};

/// Default throttle window when an action names none and the rule has
/// no `throttle_secs`.
const DEFAULT_THROTTLE_SECS: u64 = 300;

pub struct ActionDispatcher {
    lifecycle: Arc<LifecycleManager>,
    notifications: NotificationRepo,
    policies: PolicyRepo,
    throttle: ThrottleMap,
    renderer: TemplateRenderer,
    channels: ChannelsConfig,
}

impl ActionDispatcher {
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        notifications: NotificationRepo,
        policies: PolicyRepo,
        channels: ChannelsConfig,
    ) -> Self {
        Self {
            lifecycle,
            notifications,
            policies,
            throttle: ThrottleMap::new(),
            renderer: TemplateRenderer::new(),
            channels,
        }
    }

    pub fn throttle(&self) -> &ThrottleMap {
        &self.throttle
    }

    /// Run a matched rule's actions in order. A throttle hit suppresses
    /// the remaining actions for this match; other handler errors are
    /// logged and the remaining actions still run.
    pub async fn dispatch(
        &self,
        result: &EvaluationResult,
        event: &Event,
    ) -> Result<(), VigilError> {
        let rule = &result.rule.rule;
        let event_ref = EventRef {
            kind: Some(event.kind.to_string()),
            occurred_at: Some(event.occurred_at),
            rule_id: Some(rule.id),
        };

        // The alert created (or merged) earlier in this action list;
        // notifications attach to it.
        let mut current_alert: Option<Alert> = None;

        for action in &result.actions {
            match action {
                ActionSpec::Throttle { window_secs } => {
                    let window = window_secs
                        .or(rule.throttle_secs)
                        .unwrap_or(DEFAULT_THROTTLE_SECS);
                    let key = format!("{}:{}", rule.id, rule.name);
                    let decision = self.throttle.check_and_record(
                        &key,
                        ChronoDuration::seconds(window as i64),
                        Utc::now(),
                    );
                    if decision == ThrottleDecision::Suppressed {
                        debug!(rule = %rule.name, "throttled; suppressing remaining actions");
                        return Ok(());
                    }
                }

                ActionSpec::CreateAlert {
                    title,
                    description,
                    severity,
                    metadata,
                } => {
                    let mut draft = AlertDraft::from_rule_match(rule, event);
                    if let Some(title) = title {
                        draft.title = title.clone();
                    }
                    if let Some(description) = description {
                        draft.description = Some(description.clone());
                    }
                    if let Some(severity) = severity {
                        draft.severity = *severity;
                    }
                    draft.metadata.extend(metadata.clone());

                    let outcome = self
                        .lifecycle
                        .ingest(draft, &rule.group_by, event_ref.clone())
                        .await?;
                    current_alert = Some(outcome.alert().clone());
                }

                ActionSpec::SendNotification {
                    channel,
                    recipient,
                    subject,
                    template,
                } => {
                    let channel: Channel = channel.parse().map_err(VigilError::InvalidInput)?;
                    let alert = self
                        .ensure_alert(&mut current_alert, rule, event, &event_ref)
                        .await?;
                    let context =
                        NotificationContext::from_alert(&alert, Some(rule.name.clone()));
                    let rendered_subject = match subject {
                        Some(s) => self
                            .renderer
                            .render(s, &context)
                            .map_err(|e| VigilError::InvalidInput(e.to_string()))?,
                        None => self
                            .renderer
                            .render_subject(None, &context)
                            .map_err(|e| VigilError::InvalidInput(e.to_string()))?,
                    };
                    let body = self
                        .renderer
                        .render_body(template.as_deref(), &context)
                        .map_err(|e| VigilError::InvalidInput(e.to_string()))?;

                    self.enqueue_notification(
                        &alert,
                        rule.id,
                        channel,
                        recipient.clone(),
                        rendered_subject,
                        body,
                    )
                    .await?;
                }

                ActionSpec::Webhook {
                    url,
                    method: _,
                    headers: _,
                    payload,
                } => {
                    let alert = self
                        .ensure_alert(&mut current_alert, rule, event, &event_ref)
                        .await?;
                    // Defaults first; rule-provided fields win on collision.
                    let mut merged = serde_json::Map::new();
                    merged.insert("alert_id".to_string(), json!(alert.id));
                    merged.insert("rule_id".to_string(), json!(rule.id));
                    merged.insert("rule_name".to_string(), json!(rule.name));
                    merged.insert("severity".to_string(), json!(alert.severity));
                    merged.insert("title".to_string(), json!(alert.title));
                    merged.insert("event".to_string(), event.payload.clone());
                    merged.insert("timestamp".to_string(), json!(Utc::now().to_rfc3339()));
                    for (key, value) in payload {
                        merged.insert(key.clone(), value.clone());
                    }

                    self.enqueue_notification(
                        &alert,
                        rule.id,
                        Channel::Webhook,
                        url.clone(),
                        alert.title.clone(),
                        serde_json::Value::Object(merged).to_string(),
                    )
                    .await?;
                }

                ActionSpec::Escalation { policy_id } => {
                    self.handle_escalation(*policy_id, rule, event, &event_ref, &mut current_alert)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// The alert this action list works on, creating one through the
    /// lifecycle manager when no `create_alert` ran yet.
    async fn ensure_alert(
        &self,
        current: &mut Option<Alert>,
        rule: &vigil_core::rule::Rule,
        event: &Event,
        event_ref: &EventRef,
    ) -> Result<Alert, VigilError> {
        if let Some(alert) = current {
            return Ok(alert.clone());
        }
        let draft = AlertDraft::from_rule_match(rule, event);
        let outcome = self
            .lifecycle
            .ingest(draft, &rule.group_by, event_ref.clone())
            .await?;
        let alert = outcome.alert().clone();
        *current = Some(alert.clone());
        Ok(alert)
    }

    async fn enqueue_notification(
        &self,
        alert: &Alert,
        rule_id: Uuid,
        channel: Channel,
        recipient: String,
        subject: String,
        content: String,
    ) -> Result<(), VigilError> {
        let channel_config = self.channels.for_channel(channel);
        if !channel_config.enabled {
            warn!(%channel, "channel disabled; dropping notification");
            return Ok(());
        }
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::nil(), // store assigns
            alert_id: alert.id,
            rule_id: Some(rule_id),
            channel,
            recipient,
            subject,
            content,
            priority: alert.priority,
            status: NotificationStatus::Pending,
            scheduled_at: now,
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            retry_count: 0,
            max_retries: channel_config.max_retries,
            last_error: None,
            external_id: None,
            tracking_id: Some(alert.fingerprint.clone()),
            created_at: now,
            updated_at: now,
        };
        let created = self.notifications.create(notification).await?;
        debug!(notification = %created.id, %channel, "notification queued");
        Ok(())
    }

    /// Escalate an existing alert when the event names one; otherwise
    /// create a fresh alert already at level 1 under the policy.
    async fn handle_escalation(
        &self,
        policy_id: Uuid,
        rule: &vigil_core::rule::Rule,
        event: &Event,
        event_ref: &EventRef,
        current_alert: &mut Option<Alert>,
    ) -> Result<(), VigilError> {
        let policy = self.policies.get(policy_id).await?;
        if !policy.enabled {
            debug!(policy = %policy.name, "escalation policy disabled");
            return Ok(());
        }

        let existing_id = event
            .field_str("alert_id")
            .and_then(|s| Uuid::parse_str(s).ok());

        match existing_id {
            Some(alert_id) => {
                let alert = self.lifecycle.escalate(alert_id, event_ref.clone()).await?;
                *current_alert = Some(alert);
            }
            None => {
                let mut draft = AlertDraft::from_rule_match(rule, event);
                draft.escalation_policy_id = Some(policy_id);
                draft.initial_escalation_level = 1;
                draft.severity = Severity::High.max(rule.severity);
                let outcome = self
                    .lifecycle
                    .ingest(draft, &rule.group_by, event_ref.clone())
                    .await?;
                *current_alert = Some(outcome.alert().clone());
            }
        }
        Ok(())
    }
}

/// Convenience: dispatch many results, keeping failures per-rule.
impl ActionDispatcher {
    pub async fn dispatch_all(&self, results: &[EvaluationResult], event: &Event) -> usize {
        let mut succeeded = 0;
        for result in results {
            match self.dispatch(result, event).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(rule = %result.rule_name, error = %e, "action dispatch failed")
                }
            }
        }
        succeeded
    }
}
