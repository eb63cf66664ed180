//! Outbound event payloads: full entity projections plus the reference
//! to the originating detection event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vigil_core::alert::Alert;
use vigil_core::notification::Notification;

/// Reference to the detection event that triggered a lifecycle change.
/// `None` fields mean the change came from the management surface or a
/// sweep rather than an ingested event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventRef {
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGenerated {
    pub alert: Alert,
    pub event: EventRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEscalated {
    pub alert: Alert,
    pub previous_level: i32,
    pub event: EventRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResolved {
    pub alert: Alert,
    pub resolved_by: String,
    pub event: EventRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSent {
    pub notification: Notification,
    pub event: EventRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFailed {
    pub notification: Notification,
    /// Machine-readable last error for downstream consumers.
    pub last_error: String,
    pub event: EventRef,
}
