//! ZMQ-backed event source: a pump task drains the SUB socket into the
//! redelivery buffer, giving the bus ack/nack semantics it lacks
//! natively.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use vigil_bus::{EventSubscriber, ZmqSubscriber};

use crate::consumer::{EventSource, SourceHealth, SourceMessage};
use crate::error::SourceError;
use crate::memory::MemoryEventSource;

pub struct ZmqEventSource {
    buffer: Arc<MemoryEventSource>,
    pump: JoinHandle<()>,
}

impl ZmqEventSource {
    /// Subscribe to `topics` and start pumping envelopes into the
    /// buffer. Payloads must decode to JSON documents.
    pub async fn start(
        subscriber: ZmqSubscriber,
        topics: &[String],
    ) -> Result<Self, SourceError> {
        for topic in topics {
            subscriber.subscribe(topic).await?;
        }
        info!(topics = topics.len(), "input source subscribed");

        let buffer = Arc::new(MemoryEventSource::with_provider("zmq"));
        let pump_buffer = Arc::clone(&buffer);
        let pump = tokio::spawn(async move {
            loop {
                match subscriber.recv().await {
                    Ok(envelope) => {
                        let body = match envelope.decode::<serde_json::Value>() {
                            Ok(json) => json.to_string(),
                            Err(e) => {
                                warn!(topic = %envelope.topic, error = %e, "undecodable payload dropped");
                                continue;
                            }
                        };
                        pump_buffer.push_message(SourceMessage {
                            id: envelope.correlation_id.to_string(),
                            body,
                            receipt: Uuid::new_v4().to_string(),
                            timestamp: envelope.published_at,
                            attempt_count: 1,
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "input subscriber error; stopping pump");
                        return;
                    }
                }
            }
        });

        Ok(Self { buffer, pump })
    }

    /// Stop the pump. Buffered messages stay receivable until drop.
    pub fn stop(&self) {
        self.pump.abort();
    }
}

impl Drop for ZmqEventSource {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl EventSource for ZmqEventSource {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<SourceMessage>, SourceError> {
        self.buffer.receive(max, wait).await
    }

    async fn ack(&self, receipt: &str) -> Result<(), SourceError> {
        self.buffer.ack(receipt).await
    }

    async fn nack(&self, receipt: &str) -> Result<(), SourceError> {
        self.buffer.nack(receipt).await
    }

    async fn health(&self) -> SourceHealth {
        let mut health = self.buffer.health().await;
        health.connected = !self.pump.is_finished();
        health
    }
}
