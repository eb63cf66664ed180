//! Escalation policies: ordered ladders of delay + recipients.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::notification::Channel;

/// One rung of an escalation ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationStep {
    /// Seconds to wait at this level before the next escalation fires.
    pub delay_secs: u64,
    pub channels: Vec<Channel>,
    pub recipients: Vec<String>,
    /// Optional expression gating this level (same language as rule
    /// conditions; empty means always).
    #[serde(default)]
    pub condition: Option<String>,
}

/// A stored escalation policy, updated under optimistic concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub id: Uuid,
    /// Unique among non-deleted policies.
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub enabled: bool,
    /// Ordered ladder; index = escalation level − 1.
    pub steps: Vec<EscalationStep>,
    /// Expressions selecting which rules this policy applies to.
    #[serde(default)]
    pub rule_conditions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl EscalationPolicy {
    /// The step for a given escalation level (1-based), if the ladder
    /// reaches that far.
    pub fn step_for_level(&self, level: i32) -> Option<&EscalationStep> {
        if level < 1 {
            return None;
        }
        self.steps.get((level - 1) as usize)
    }

    pub fn max_level(&self) -> i32 {
        self.steps.len() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy_with_steps(n: usize) -> EscalationPolicy {
        EscalationPolicy {
            id: Uuid::new_v4(),
            name: "p".to_string(),
            description: None,
            enabled: true,
            steps: (0..n)
                .map(|i| EscalationStep {
                    delay_secs: 60 * (i as u64 + 1),
                    channels: vec![Channel::Email],
                    recipients: vec![format!("tier{}@example.com", i + 1)],
                    condition: None,
                })
                .collect(),
            rule_conditions: Vec::new(),
            tags: Vec::new(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
            version: 1,
        }
    }

    #[test]
    fn step_lookup_is_one_based() {
        let policy = policy_with_steps(3);
        assert!(policy.step_for_level(0).is_none());
        assert_eq!(policy.step_for_level(1).unwrap().delay_secs, 60);
        assert_eq!(policy.step_for_level(3).unwrap().delay_secs, 180);
        assert!(policy.step_for_level(4).is_none());
        assert_eq!(policy.max_level(), 3);
    }
}
