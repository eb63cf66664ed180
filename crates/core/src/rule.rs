//! Rule definitions: what to match and what to do about it.
//!
//! A rule carries an AND-joined list of condition expression strings and
//! an ordered list of [`ActionSpec`]s executed on match. Rules are stored
//! durably, refreshed into the compiled cache at a configured interval,
//! and updated under optimistic concurrency (`version`).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Severity / priority ─────────────────────────────────────────────

/// Alert severity, ordered so `Critical` compares greatest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch priority, ordered so `Critical` compares greatest.
///
/// Distinct from [`Severity`]: severity describes the condition, priority
/// drives notification ordering within a channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Actions ─────────────────────────────────────────────────────────

/// What a matched rule does, as a tagged sum.
///
/// Serialized with a `type` discriminator so the stored JSON stays
/// readable and forward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionSpec {
    /// Materialize an alert, routed through deduplication.
    CreateAlert {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        severity: Option<Severity>,
        #[serde(default)]
        metadata: HashMap<String, serde_json::Value>,
    },
    /// Queue a notification on a named channel.
    SendNotification {
        channel: String,
        recipient: String,
        #[serde(default)]
        subject: Option<String>,
        #[serde(default)]
        template: Option<String>,
    },
    /// Post a merged JSON payload to an external URL.
    Webhook {
        url: String,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
        /// Rule-provided fields; override defaults on key collision.
        #[serde(default)]
        payload: HashMap<String, serde_json::Value>,
    },
    /// Escalate an existing alert or create one at level 1.
    Escalation { policy_id: Uuid },
    /// Suppress subsequent actions for this rule within the window.
    Throttle {
        #[serde(default)]
        window_secs: Option<u64>,
    },
}

impl ActionSpec {
    /// The `type` tag, matching the serialized discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionSpec::CreateAlert { .. } => "create_alert",
            ActionSpec::SendNotification { .. } => "send_notification",
            ActionSpec::Webhook { .. } => "webhook",
            ActionSpec::Escalation { .. } => "escalation",
            ActionSpec::Throttle { .. } => "throttle",
        }
    }
}

// ── Rule ────────────────────────────────────────────────────────────

/// A stored alerting rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    /// Unique among non-deleted rules.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form category (e.g. "aml", "fraud", "ops").
    pub kind: String,
    pub severity: Severity,
    pub priority: Priority,
    pub enabled: bool,
    /// Condition expressions, AND-joined at evaluation time.
    pub conditions: Vec<String>,
    /// Actions executed in order on match.
    pub actions: Vec<ActionSpec>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Minimum seconds between successive action runs for this rule.
    #[serde(default)]
    pub throttle_secs: Option<u64>,
    /// Lookback window handed to enriched evaluation slots.
    #[serde(default)]
    pub evaluation_window_secs: Option<u64>,
    /// Event payload keys whose values form the correlation id.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Channel identifiers for rule-level notification fan-out.
    #[serde(default)]
    pub notification_channels: Vec<String>,
    #[serde(default)]
    pub escalation_policy_id: Option<Uuid>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Strictly increases on every successful update.
    pub version: i64,
}

impl Rule {
    /// Validate invariants the store relies on.
    pub fn validate(&self) -> Result<(), crate::VigilError> {
        if self.name.trim().is_empty() {
            return Err(crate::VigilError::InvalidInput(
                "rule name must not be empty".to_string(),
            ));
        }
        if self.conditions.is_empty() {
            return Err(crate::VigilError::InvalidInput(format!(
                "rule '{}' has no conditions",
                self.name
            )));
        }
        if self.actions.is_empty() {
            return Err(crate::VigilError::InvalidInput(format!(
                "rule '{}' has no actions",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn action_spec_json_tag() {
        let action = ActionSpec::SendNotification {
            channel: "slack".to_string(),
            recipient: "#alerts".to_string(),
            subject: None,
            template: None,
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["type"], "send_notification");
        assert_eq!(action.kind(), "send_notification");

        let back: ActionSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn throttle_window_optional() {
        let action: ActionSpec = serde_json::from_str(r#"{"type": "throttle"}"#).unwrap();
        assert_eq!(action, ActionSpec::Throttle { window_secs: None });
    }
}
