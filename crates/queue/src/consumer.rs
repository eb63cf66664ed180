//! Event-source trait and message types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// A raw message pulled from the input bus, pending acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMessage {
    /// Message identifier from the source.
    pub id: String,
    /// Raw JSON body.
    pub body: String,
    /// Handle passed back to `ack`/`nack`.
    pub receipt: String,
    /// When the producer published the message.
    pub timestamp: DateTime<Utc>,
    /// Delivery attempt count (1 on first receive).
    pub attempt_count: u32,
}

/// Health snapshot of a source connection.
#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub connected: bool,
    /// Messages buffered but not yet received by the engine.
    pub pending: u64,
    /// Messages received but not yet acked (in flight).
    pub in_flight: u64,
    /// Messages acked since startup.
    pub processed: u64,
    pub provider: String,
}

impl fmt::Display for SourceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SourceHealth {{ connected: {}, pending: {}, in_flight: {}, processed: {}, provider: {} }}",
            self.connected, self.pending, self.in_flight, self.processed, self.provider
        )
    }
}

/// Trait for input event sources.
///
/// Implementations provide at-least-once delivery: a message stays
/// redeliverable until `ack`ed, and `nack` makes it immediately
/// redeliverable with a bumped attempt count.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Pull up to `max` messages, waiting at most `wait` for the first.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<SourceMessage>, SourceError>;

    /// Commit a message as fully processed.
    async fn ack(&self, receipt: &str) -> Result<(), SourceError>;

    /// Return a message for redelivery after a processing failure.
    async fn nack(&self, receipt: &str) -> Result<(), SourceError>;

    async fn health(&self) -> SourceHealth;
}
