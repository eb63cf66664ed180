//! Parse source message bodies into typed [`Event`]s.

use serde_json::Value;

use vigil_core::event::{Event, EventKind};

use crate::consumer::SourceMessage;
use crate::error::SourceError;

/// Parse one message body into an [`Event`].
///
/// The body must be a JSON object bearing a `type` discriminator; a
/// `timestamp` (RFC 3339) is used as the producer timestamp and falls
/// back to the message timestamp when missing or unparsable.
pub fn parse_event(message: &SourceMessage) -> Result<Event, SourceError> {
    let json: Value = serde_json::from_str(&message.body)
        .map_err(|e| SourceError::Parse(format!("message {}: invalid JSON: {e}", message.id)))?;

    let obj = json
        .as_object()
        .ok_or_else(|| SourceError::Parse(format!("message {}: body is not an object", message.id)))?;

    let kind: EventKind = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SourceError::Parse(format!("message {}: missing 'type'", message.id)))?
        .parse()
        .map_err(|e| SourceError::Parse(format!("message {}: {e}", message.id)))?;

    let occurred_at = obj
        .get("timestamp")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse().ok())
        .unwrap_or(message.timestamp);

    Ok(Event::new(kind, json, occurred_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(body: &str) -> SourceMessage {
        SourceMessage {
            id: "m-1".to_string(),
            body: body.to_string(),
            receipt: "r-1".to_string(),
            timestamp: Utc::now(),
            attempt_count: 1,
        }
    }

    #[test]
    fn parses_typed_event() {
        let event = parse_event(&message(
            r#"{"type": "anomaly_detected", "timestamp": "2026-07-01T12:00:00Z", "amount": 99}"#,
        ))
        .unwrap();
        assert_eq!(event.kind, EventKind::AnomalyDetected);
        assert_eq!(event.occurred_at.to_rfc3339(), "2026-07-01T12:00:00+00:00");
        assert_eq!(event.field("amount").and_then(|v| v.as_i64()), Some(99));
    }

    #[test]
    fn missing_type_is_an_error() {
        assert!(parse_event(&message(r#"{"timestamp": "2026-07-01T12:00:00Z"}"#)).is_err());
    }

    #[test]
    fn unknown_type_is_an_error() {
        assert!(parse_event(&message(r#"{"type": "mystery"}"#)).is_err());
    }

    #[test]
    fn bad_timestamp_falls_back_to_message_time() {
        let msg = message(r#"{"type": "system_error", "timestamp": "not-a-date"}"#);
        let event = parse_event(&msg).unwrap();
        assert_eq!(event.occurred_at, msg.timestamp);
    }

    #[test]
    fn non_object_rejected() {
        assert!(parse_event(&message("[1, 2, 3]")).is_err());
        assert!(parse_event(&message("not json")).is_err());
    }
}
