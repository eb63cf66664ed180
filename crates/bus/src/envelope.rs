//! Wire envelope carried on every bus topic.
//!
//! MessagePack-encoded. The topic rides both in the envelope and as the
//! first ZMQ frame so SUB sockets can prefix-filter without decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BusError;

/// Envelope schema version; bump on incompatible payload changes.
const SCHEMA_VERSION: u16 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing topic, e.g. `vigil.alert.generated`.
    pub topic: String,
    /// MessagePack-encoded payload.
    pub payload: Vec<u8>,
    pub published_at: DateTime<Utc>,
    /// Tracks one logical flow across components.
    pub correlation_id: Uuid,
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
}

fn default_schema_version() -> u16 {
    SCHEMA_VERSION
}

impl Envelope {
    pub fn new<T: Serialize>(topic: impl Into<String>, payload: &T) -> Result<Self, BusError> {
        Ok(Self {
            topic: topic.into(),
            payload: rmp_serde::to_vec_named(payload)?,
            published_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
        })
    }

    /// Build an envelope continuing an existing flow.
    pub fn correlated<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, BusError> {
        let mut envelope = Self::new(topic, payload)?;
        envelope.correlation_id = correlation_id;
        Ok(envelope)
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, BusError> {
        Ok(rmp_serde::from_slice(&self.payload)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BusError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_round_trip() {
        let payload = json!({"alert_id": "a-1", "status": "open"});
        let envelope = Envelope::new("vigil.alert.generated", &payload).unwrap();
        assert_eq!(envelope.decode::<serde_json::Value>().unwrap(), payload);
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope::new("vigil.test", &42u64).unwrap();
        let restored = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.topic, "vigil.test");
        assert_eq!(restored.correlation_id, envelope.correlation_id);
        assert_eq!(restored.decode::<u64>().unwrap(), 42);
    }

    #[test]
    fn correlated_keeps_id() {
        let id = Uuid::new_v4();
        let envelope = Envelope::correlated("vigil.test", &true, id).unwrap();
        assert_eq!(envelope.correlation_id, id);
    }
}
