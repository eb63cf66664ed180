//! In-memory event source: the redelivery buffer used by tests and,
//! internally, by the ZMQ-backed source.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::consumer::{EventSource, SourceHealth, SourceMessage};
use crate::error::SourceError;

#[derive(Default)]
struct Inner {
    pending: VecDeque<SourceMessage>,
    in_flight: HashMap<String, SourceMessage>,
    processed: u64,
}

/// Queue with explicit ack/nack. Unacked messages stay in flight;
/// nacked ones return to the head of the queue with a bumped attempt
/// count.
pub struct MemoryEventSource {
    inner: Mutex<Inner>,
    arrived: Notify,
    provider: &'static str,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self::with_provider("memory")
    }

    pub(crate) fn with_provider(provider: &'static str) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            arrived: Notify::new(),
            provider,
        }
    }

    /// Enqueue a raw JSON body as a fresh message.
    pub fn push(&self, body: impl Into<String>) {
        self.push_message(SourceMessage {
            id: Uuid::new_v4().to_string(),
            body: body.into(),
            receipt: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            attempt_count: 1,
        });
    }

    pub(crate) fn push_message(&self, message: SourceMessage) {
        self.inner
            .lock()
            .expect("source buffer poisoned")
            .pending
            .push_back(message);
        self.arrived.notify_one();
    }
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<SourceMessage>, SourceError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            {
                let mut inner = self.inner.lock().expect("source buffer poisoned");
                if !inner.pending.is_empty() {
                    let take = max.min(inner.pending.len());
                    let mut batch = Vec::with_capacity(take);
                    for _ in 0..take {
                        let message = inner.pending.pop_front().expect("len checked");
                        inner
                            .in_flight
                            .insert(message.receipt.clone(), message.clone());
                        batch.push(message);
                    }
                    return Ok(batch);
                }
            }
            if tokio::time::timeout_at(deadline, self.arrived.notified())
                .await
                .is_err()
            {
                return Ok(Vec::new());
            }
        }
    }

    async fn ack(&self, receipt: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().expect("source buffer poisoned");
        inner
            .in_flight
            .remove(receipt)
            .ok_or_else(|| SourceError::Ack(format!("unknown receipt '{receipt}'")))?;
        inner.processed += 1;
        Ok(())
    }

    async fn nack(&self, receipt: &str) -> Result<(), SourceError> {
        let mut inner = self.inner.lock().expect("source buffer poisoned");
        let mut message = inner
            .in_flight
            .remove(receipt)
            .ok_or_else(|| SourceError::Ack(format!("unknown receipt '{receipt}'")))?;
        message.attempt_count += 1;
        inner.pending.push_front(message);
        drop(inner);
        self.arrived.notify_one();
        Ok(())
    }

    async fn health(&self) -> SourceHealth {
        let inner = self.inner.lock().expect("source buffer poisoned");
        SourceHealth {
            connected: true,
            pending: inner.pending.len() as u64,
            in_flight: inner.in_flight.len() as u64,
            processed: inner.processed,
            provider: self.provider.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn receive_ack_cycle() {
        let source = MemoryEventSource::new();
        source.push(r#"{"type": "system_error"}"#);

        let batch = source.receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].attempt_count, 1);

        source.ack(&batch[0].receipt).await.unwrap();
        let health = source.health().await;
        assert_eq!(health.processed, 1);
        assert_eq!(health.in_flight, 0);
    }

    #[tokio::test]
    async fn nack_redelivers_with_bumped_attempt() {
        let source = MemoryEventSource::new();
        source.push(r#"{"type": "system_error"}"#);

        let batch = source.receive(10, Duration::from_millis(50)).await.unwrap();
        source.nack(&batch[0].receipt).await.unwrap();

        let again = source.receive(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, batch[0].id);
        assert_eq!(again[0].attempt_count, 2);
    }

    #[tokio::test]
    async fn receive_times_out_empty() {
        let source = MemoryEventSource::new();
        let batch = source.receive(10, Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn double_ack_is_an_error() {
        let source = MemoryEventSource::new();
        source.push(r#"{"type": "system_error"}"#);
        let batch = source.receive(1, Duration::from_millis(50)).await.unwrap();
        source.ack(&batch[0].receipt).await.unwrap();
        assert!(source.ack(&batch[0].receipt).await.is_err());
    }
}
