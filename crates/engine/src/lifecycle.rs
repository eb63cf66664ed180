//! Alert lifecycle manager: deduplicated creation, the state-machine
//! transitions, and the sweep operations, with lifecycle events
//! published on the output bus.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vigil_bus::{
    topics, AlertEscalated, AlertGenerated, AlertResolved, Envelope, EventPublisher, EventRef,
};
use vigil_core::alert::{Alert, AlertStatus};
use vigil_core::config::LifecycleConfig;
use vigil_core::event::Event;
use vigil_core::rule::{Priority, Rule, Severity};
use vigil_core::VigilError;
use vigil_store::alerts::DedupOutcome;
use vigil_store::AlertRepo;

use crate::fingerprint::{alert_fingerprint, correlation_key};

/// Everything needed to materialize an alert, before the manager fills
/// in fingerprint, correlation, expiry, and audit fields.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub rule_id: Option<Uuid>,
    pub kind: String,
    pub severity: Severity,
    pub priority: Priority,
    pub title: String,
    pub description: Option<String>,
    pub source: String,
    pub event_payload: serde_json::Value,
    pub entity_ids: Vec<String>,
    pub tags: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub escalation_policy_id: Option<Uuid>,
    /// Non-zero for alerts born from an escalation action.
    pub initial_escalation_level: i32,
}

impl AlertDraft {
    /// Draft from a matched rule and the triggering event. Entity ids
    /// come from the payload's `entity_id` / `entity_ids` fields.
    pub fn from_rule_match(rule: &Rule, event: &Event) -> Self {
        let mut entity_ids = Vec::new();
        if let Some(id) = event.field_str("entity_id") {
            entity_ids.push(id.to_string());
        }
        if let Some(ids) = event.field("entity_ids").and_then(|v| v.as_array()) {
            entity_ids.extend(ids.iter().filter_map(|v| v.as_str().map(str::to_string)));
        }

        Self {
            rule_id: Some(rule.id),
            kind: rule.kind.clone(),
            severity: rule.severity,
            priority: rule.priority,
            title: rule.name.clone(),
            description: rule.description.clone(),
            source: event.kind.to_string(),
            event_payload: event.payload.clone(),
            entity_ids,
            tags: rule.tags.clone(),
            metadata: HashMap::new(),
            escalation_policy_id: rule.escalation_policy_id,
            initial_escalation_level: 0,
        }
    }
}

pub struct LifecycleManager {
    alerts: AlertRepo,
    events: Arc<dyn EventPublisher>,
    config: LifecycleConfig,
    hash_salt: String,
}

impl LifecycleManager {
    pub fn new(
        alerts: AlertRepo,
        events: Arc<dyn EventPublisher>,
        config: LifecycleConfig,
        hash_salt: String,
    ) -> Self {
        Self {
            alerts,
            events,
            config,
            hash_salt,
        }
    }

    /// Create an alert through deduplication.
    ///
    /// Same-fingerprint occurrences inside the window merge into the
    /// existing alert; only a genuinely new alert emits
    /// `alert.generated`. The correlation id is derived independently
    /// of dedup from the rule's group-by keys.
    pub async fn ingest(
        &self,
        draft: AlertDraft,
        group_by: &[String],
        event_ref: EventRef,
    ) -> Result<DedupOutcome, VigilError> {
        let fingerprint = alert_fingerprint(
            draft.rule_id,
            &draft.kind,
            draft.severity,
            &draft.entity_ids,
            &draft.metadata,
            &self.config.fingerprint_metadata_keys,
            &self.hash_salt,
        );
        let correlation_id = correlation_key(group_by, &draft.event_payload);
        let now = Utc::now();

        let alert = Alert {
            id: Uuid::nil(), // store assigns
            rule_id: draft.rule_id,
            kind: draft.kind,
            severity: draft.severity,
            priority: draft.priority,
            status: AlertStatus::Open,
            title: draft.title,
            description: draft.description,
            source: draft.source,
            event_payload: draft.event_payload,
            entity_ids: draft.entity_ids,
            tags: draft.tags,
            metadata: draft.metadata,
            fingerprint,
            correlation_id,
            parent_alert_id: None,
            escalation_level: draft.initial_escalation_level,
            escalation_policy_id: draft.escalation_policy_id,
            assigned_to: None,
            notification_sent: false,
            expires_at: Some(now + self.config.alert_ttl()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            resolution_reason: None,
            escalated_at: if draft.initial_escalation_level > 0 {
                Some(now)
            } else {
                None
            },
        };

        let outcome = self
            .alerts
            .create_deduplicated(alert, self.config.deduplication_window())
            .await
            .map_err(VigilError::from)?;

        match &outcome {
            DedupOutcome::Created(alert) => {
                info!(alert = %alert.id, fingerprint = %alert.fingerprint, "alert created");
                self.publish(
                    topics::ALERT_GENERATED,
                    &AlertGenerated {
                        alert: alert.clone(),
                        event: event_ref,
                    },
                )
                .await;
            }
            DedupOutcome::Merged(alert) => {
                debug!(
                    alert = %alert.id,
                    occurrences = alert.occurrence_count(),
                    "duplicate occurrence merged"
                );
            }
        }
        Ok(outcome)
    }

    /// `open → acknowledged`.
    pub async fn acknowledge(&self, id: Uuid, actor: &str) -> Result<Alert, VigilError> {
        if actor.trim().is_empty() {
            return Err(VigilError::InvalidInput("actor is required".to_string()));
        }
        Ok(self.alerts.acknowledge(id, actor).await?)
    }

    /// `open|acknowledged|escalated → resolved`, emitting `alert.resolved`.
    pub async fn resolve(
        &self,
        id: Uuid,
        actor: &str,
        reason: Option<&str>,
    ) -> Result<Alert, VigilError> {
        if actor.trim().is_empty() {
            return Err(VigilError::InvalidInput("actor is required".to_string()));
        }
        let alert = self.alerts.resolve(id, actor, reason).await?;
        self.publish(
            topics::ALERT_RESOLVED,
            &AlertResolved {
                alert: alert.clone(),
                resolved_by: actor.to_string(),
                event: EventRef::default(),
            },
        )
        .await;
        Ok(alert)
    }

    /// Bump the escalation level (bounded), emitting `alert.escalated`.
    pub async fn escalate(&self, id: Uuid, event_ref: EventRef) -> Result<Alert, VigilError> {
        let alert = self
            .alerts
            .escalate(id, self.config.max_escalation_level)
            .await?;
        info!(alert = %alert.id, level = alert.escalation_level, "alert escalated");
        self.publish(
            topics::ALERT_ESCALATED,
            &AlertEscalated {
                previous_level: alert.escalation_level - 1,
                alert: alert.clone(),
                event: event_ref,
            },
        )
        .await;
        Ok(alert)
    }

    /// Expiry sweep: move past-due non-terminal alerts to `expired`.
    pub async fn sweep_expired(&self) -> Result<usize, VigilError> {
        let expired = self.alerts.expire_due().await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "alerts expired");
        }
        Ok(expired.len())
    }

    /// Escalation sweep: one level bump for every due alert.
    pub async fn sweep_escalations(&self) -> Result<usize, VigilError> {
        let due = self
            .alerts
            .list_for_escalation(
                self.config.escalation_interval(),
                self.config.max_escalation_level,
            )
            .await?;

        let mut escalated = 0;
        for alert in due {
            match self.escalate(alert.id, EventRef::default()).await {
                Ok(_) => escalated += 1,
                // A racing transition (resolve, another sweep) is fine.
                Err(VigilError::Conflict(_)) | Err(VigilError::NotFound(_)) => {}
                Err(e) => warn!(alert = %alert.id, error = %e, "escalation failed"),
            }
        }
        Ok(escalated)
    }

    pub fn alerts(&self) -> &AlertRepo {
        &self.alerts
    }

    async fn publish<T: serde::Serialize>(&self, topic: &str, payload: &T) {
        match Envelope::new(topic, payload) {
            Ok(envelope) => {
                if let Err(e) = self.events.publish(envelope).await {
                    warn!(topic, error = %e, "failed to publish lifecycle event");
                }
            }
            Err(e) => warn!(topic, error = %e, "failed to encode lifecycle event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // State-machine path conformance: applying any sequence of
    // transition attempts to a fresh alert only ever walks edges the
    // table allows, and terminal states absorb everything.
    #[derive(Debug, Clone, Copy)]
    enum Op {
        Acknowledge,
        Resolve,
        Escalate,
        Expire,
    }

    fn apply(status: AlertStatus, op: Op) -> Option<AlertStatus> {
        let target = match op {
            Op::Acknowledge => AlertStatus::Acknowledged,
            Op::Resolve => AlertStatus::Resolved,
            Op::Escalate => AlertStatus::Escalated,
            Op::Expire => AlertStatus::Expired,
        };
        status.can_transition_to(target).then_some(target)
    }

    proptest! {
        #[test]
        fn status_paths_conform(ops in proptest::collection::vec(0u8..4, 0..24)) {
            let mut status = AlertStatus::Open;
            let mut seen = vec![status];
            for op in ops {
                let op = match op {
                    0 => Op::Acknowledge,
                    1 => Op::Resolve,
                    2 => Op::Escalate,
                    _ => Op::Expire,
                };
                if let Some(next) = apply(status, op) {
                    status = next;
                    seen.push(status);
                }
            }
            // Terminal states, once entered, must end the path.
            let first_terminal = seen.iter().position(|s| s.is_terminal());
            if let Some(at) = first_terminal {
                prop_assert_eq!(at, seen.len() - 1);
            }
            // Acknowledged never precedes escalated.
            for pair in seen.windows(2) {
                prop_assert!(
                    !(pair[0] == AlertStatus::Acknowledged && pair[1] == AlertStatus::Escalated)
                );
            }
        }
    }
}
