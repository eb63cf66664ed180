//! Topic constants for bus routing, `vigil.<domain>.<event>`.

// ── Outbound lifecycle topics ───────────────────────────────────────

/// A new alert row was created (dedup-merged occurrences do not fire).
pub const ALERT_GENERATED: &str = "vigil.alert.generated";

/// An alert moved up one escalation level.
pub const ALERT_ESCALATED: &str = "vigil.alert.escalated";

/// An alert was resolved by an actor.
pub const ALERT_RESOLVED: &str = "vigil.alert.resolved";

/// A notification was handed to its provider.
pub const NOTIFICATION_SENT: &str = "vigil.notification.sent";

/// A notification exhausted its retries (or was rejected permanently).
pub const NOTIFICATION_FAILED: &str = "vigil.notification.failed";

// ── Inbound detection topics ────────────────────────────────────────

/// Prefix shared by all inbound detection-event topics.
pub const EVENTS_PREFIX: &str = "events.";
