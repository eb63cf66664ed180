//! Alert fingerprinting and correlation keys.
//!
//! The fingerprint is a salted SHA-256 over a canonical projection of
//! the alert: rule id, kind, severity, the sorted entity-id set, and
//! the configured metadata keys as sorted `k=v` pairs. Two occurrences
//! with equal projections are "the same alert" for deduplication.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use vigil_core::rule::Severity;

const FIELD_SEPARATOR: u8 = 0x1f;

/// Compute the canonical alert fingerprint.
pub fn alert_fingerprint(
    rule_id: Option<Uuid>,
    kind: &str,
    severity: Severity,
    entity_ids: &[String],
    metadata: &HashMap<String, serde_json::Value>,
    projection_keys: &[String],
    salt: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(
        rule_id
            .map(|id| id.to_string())
            .unwrap_or_default()
            .as_bytes(),
    );
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(kind.as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(severity.as_str().as_bytes());

    let mut entities: Vec<&str> = entity_ids.iter().map(String::as_str).collect();
    entities.sort_unstable();
    entities.dedup();
    for entity in entities {
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(entity.as_bytes());
    }

    let mut keys: Vec<&String> = projection_keys
        .iter()
        .filter(|k| metadata.contains_key(k.as_str()))
        .collect();
    keys.sort_unstable();
    for key in keys {
        hasher.update([FIELD_SEPARATOR]);
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        // to_string on a serde_json Value is canonical (sorted keys).
        hasher.update(metadata[key.as_str()].to_string().as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// Derive a correlation key from a rule's group-by keys and the event
/// payload. `None` when the rule declares no grouping or the payload
/// carries none of the keys.
pub fn correlation_key(group_by: &[String], payload: &serde_json::Value) -> Option<String> {
    if group_by.is_empty() {
        return None;
    }
    let obj = payload.as_object()?;
    let parts: Vec<String> = group_by
        .iter()
        .filter_map(|key| {
            obj.get(key).map(|value| match value {
                serde_json::Value::String(s) => format!("{key}={s}"),
                other => format!("{key}={other}"),
            })
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> HashMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn entity_order_does_not_matter() {
        let rule = Some(Uuid::new_v4());
        let a = alert_fingerprint(
            rule,
            "anomaly",
            Severity::High,
            &["b".to_string(), "a".to_string()],
            &HashMap::new(),
            &[],
            "salt",
        );
        let b = alert_fingerprint(
            rule,
            "anomaly",
            Severity::High,
            &["a".to_string(), "b".to_string(), "a".to_string()],
            &HashMap::new(),
            &[],
            "salt",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn severity_changes_fingerprint() {
        let rule = Some(Uuid::new_v4());
        let high = alert_fingerprint(rule, "k", Severity::High, &[], &HashMap::new(), &[], "s");
        let low = alert_fingerprint(rule, "k", Severity::Low, &[], &HashMap::new(), &[], "s");
        assert_ne!(high, low);
    }

    #[test]
    fn only_projected_metadata_counts() {
        let rule = Some(Uuid::new_v4());
        let base = meta(&[("region", json!("eu")), ("noise", json!(1))]);
        let noisy = meta(&[("region", json!("eu")), ("noise", json!(999))]);
        let projection = vec!["region".to_string()];

        let a = alert_fingerprint(rule, "k", Severity::High, &[], &base, &projection, "s");
        let b = alert_fingerprint(rule, "k", Severity::High, &[], &noisy, &projection, "s");
        assert_eq!(a, b);

        let other_region = meta(&[("region", json!("us"))]);
        let c = alert_fingerprint(rule, "k", Severity::High, &[], &other_region, &projection, "s");
        assert_ne!(a, c);
    }

    #[test]
    fn salt_isolates_deployments() {
        let rule = Some(Uuid::new_v4());
        let a = alert_fingerprint(rule, "k", Severity::High, &[], &HashMap::new(), &[], "s1");
        let b = alert_fingerprint(rule, "k", Severity::High, &[], &HashMap::new(), &[], "s2");
        assert_ne!(a, b);
    }

    #[test]
    fn correlation_from_group_by() {
        let payload = json!({"account": "acc-9", "region": "eu", "amount": 5});
        let key = correlation_key(&["account".to_string(), "region".to_string()], &payload);
        assert_eq!(key.as_deref(), Some("account=acc-9|region=eu"));

        assert_eq!(correlation_key(&[], &payload), None);
        assert_eq!(
            correlation_key(&["missing".to_string()], &payload),
            None
        );
    }
}
