//! Alerts and their lifecycle state machine.
//!
//! The state machine is intentionally small:
//!
//! ```text
//! open ──acknowledge──▶ acknowledged ──resolve──▶ resolved
//!  │                        │
//!  ├──escalate──▶ escalated ┴──resolve──▶ resolved
//!  │                  │
//!  └──────── sweep ───┴──▶ expired
//! ```
//!
//! `resolved` and `expired` are terminal. Archival is a soft-delete flag
//! orthogonal to status.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::{Priority, Severity};

// ── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Escalated,
    Resolved,
    Expired,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Escalated => "escalated",
            AlertStatus::Resolved => "resolved",
            AlertStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Expired)
    }

    /// Whether `self → to` is a legal state-machine edge.
    pub fn can_transition_to(&self, to: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, to),
            (Open, Acknowledged)
                | (Open, Escalated)
                | (Open, Resolved)
                | (Open, Expired)
                | (Acknowledged, Resolved)
                | (Acknowledged, Expired)
                | (Escalated, Escalated)
                | (Escalated, Resolved)
                | (Escalated, Expired)
        )
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "escalated" => Ok(AlertStatus::Escalated),
            "resolved" => Ok(AlertStatus::Resolved),
            "expired" => Ok(AlertStatus::Expired),
            other => Err(format!("unknown alert status: {other}")),
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Alert ───────────────────────────────────────────────────────────

/// A durable record of a condition warranting attention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// Originating rule; `None` for manually created alerts.
    pub rule_id: Option<Uuid>,
    pub kind: String,
    pub severity: Severity,
    pub priority: Priority,
    pub status: AlertStatus,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Producer system the triggering event came from.
    pub source: String,
    /// Snapshot of the triggering event payload.
    pub event_payload: serde_json::Value,
    /// Entities implicated by the alert (account ids, device ids, ...).
    #[serde(default)]
    pub entity_ids: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Stable dedup hash; immutable after creation.
    pub fingerprint: String,
    /// Optional incident grouping key. Independent of dedup.
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub parent_alert_id: Option<Uuid>,
    /// Monotonic non-decreasing escalation step counter.
    pub escalation_level: i32,
    #[serde(default)]
    pub escalation_policy_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    pub notification_sent: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolution_reason: Option<String>,
    #[serde(default)]
    pub escalated_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// Occurrence counter kept in metadata, bumped on dedup merges.
    pub const OCCURRENCE_KEY: &'static str = "occurrence_count";
    /// Last-seen timestamp kept in metadata, refreshed on dedup merges.
    pub const LAST_OCCURRED_KEY: &'static str = "last_occurred_at";

    /// How many times this alert's fingerprint has been observed.
    pub fn occurrence_count(&self) -> u64 {
        self.metadata
            .get(Self::OCCURRENCE_KEY)
            .and_then(|v| v.as_u64())
            .unwrap_or(1)
    }

    /// Whether the alert is past its expiry timestamp at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_admit_nothing() {
        for from in [AlertStatus::Resolved, AlertStatus::Expired] {
            for to in [
                AlertStatus::Open,
                AlertStatus::Acknowledged,
                AlertStatus::Escalated,
                AlertStatus::Resolved,
                AlertStatus::Expired,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn open_paths() {
        assert!(AlertStatus::Open.can_transition_to(AlertStatus::Acknowledged));
        assert!(AlertStatus::Open.can_transition_to(AlertStatus::Escalated));
        assert!(AlertStatus::Open.can_transition_to(AlertStatus::Resolved));
        assert!(!AlertStatus::Acknowledged.can_transition_to(AlertStatus::Escalated));
        // Re-escalation stays in escalated.
        assert!(AlertStatus::Escalated.can_transition_to(AlertStatus::Escalated));
    }
}
