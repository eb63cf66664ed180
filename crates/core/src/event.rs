//! Transient detection events flowing into the engine.
//!
//! Events live for exactly one evaluation cycle. They are parsed off the
//! input bus, fanned out across the rule set, and dropped; the engine
//! never persists them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kinds of detection events the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PatternDetected,
    AnomalyDetected,
    InvestigationCreated,
    InvestigationUpdated,
    AnalysisCompleted,
    DataQualityIssue,
    SystemError,
    ThresholdViolation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PatternDetected => "pattern_detected",
            EventKind::AnomalyDetected => "anomaly_detected",
            EventKind::InvestigationCreated => "investigation_created",
            EventKind::InvestigationUpdated => "investigation_updated",
            EventKind::AnalysisCompleted => "analysis_completed",
            EventKind::DataQualityIssue => "data_quality_issue",
            EventKind::SystemError => "system_error",
            EventKind::ThresholdViolation => "threshold_violation",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pattern_detected" => Ok(EventKind::PatternDetected),
            "anomaly_detected" => Ok(EventKind::AnomalyDetected),
            "investigation_created" => Ok(EventKind::InvestigationCreated),
            "investigation_updated" => Ok(EventKind::InvestigationUpdated),
            "analysis_completed" => Ok(EventKind::AnalysisCompleted),
            "data_quality_issue" => Ok(EventKind::DataQualityIssue),
            "system_error" => Ok(EventKind::SystemError),
            "threshold_violation" => Ok(EventKind::ThresholdViolation),
            other => Err(format!("unknown event kind: {other}")),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single detection event.
///
/// `payload` is the producer's structured document, kept opaque except for
/// the `type` discriminator and `timestamp` extracted at parse time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    /// Arbitrary producer payload (always a JSON object).
    pub payload: serde_json::Value,
    /// Producer-side timestamp.
    pub occurred_at: DateTime<Utc>,
    /// When the engine pulled the event off the bus.
    pub received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, payload: serde_json::Value, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            payload,
            occurred_at,
            received_at: Utc::now(),
        }
    }

    /// Look up a payload field by key (top level only).
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.as_object().and_then(|m| m.get(key))
    }

    /// String payload field, if present and a string.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn event_kind_round_trips() {
        for kind in [
            EventKind::PatternDetected,
            EventKind::AnomalyDetected,
            EventKind::InvestigationCreated,
            EventKind::InvestigationUpdated,
            EventKind::AnalysisCompleted,
            EventKind::DataQualityIssue,
            EventKind::SystemError,
            EventKind::ThresholdViolation,
        ] {
            assert_eq!(EventKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn field_lookup() {
        let event = Event::new(
            EventKind::AnomalyDetected,
            serde_json::json!({"entity_id": "acc-1", "amount": 5000}),
            Utc::now(),
        );
        assert_eq!(event.field_str("entity_id"), Some("acc-1"));
        assert!(event.field("missing").is_none());
    }
}
