//! In-process bus for tests and single-binary deployments.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::sync::Mutex;

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::traits::{EventPublisher, EventSubscriber};

const CHANNEL_CAPACITY: usize = 1024;

/// Broadcast-backed bus; every subscriber handle sees every envelope
/// matching one of its prefixes.
pub struct MemoryBus {
    tx: broadcast::Sender<Envelope>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// A new independent subscriber handle.
    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            rx: Mutex::new(self.tx.subscribe()),
            prefixes: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for MemoryBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        // No subscribers is fine; the envelope just goes nowhere.
        let _ = self.tx.send(envelope);
        Ok(())
    }
}

pub struct MemorySubscriber {
    rx: Mutex<broadcast::Receiver<Envelope>>,
    prefixes: RwLock<Vec<String>>,
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        self.prefixes
            .write()
            .expect("prefix list poisoned")
            .push(topic_prefix.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<Envelope, BusError> {
        let mut rx = self.rx.lock().await;
        loop {
            let envelope = match rx.recv().await {
                Ok(envelope) => envelope,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
            };
            let matches = {
                let prefixes = self.prefixes.read().expect("prefix list poisoned");
                prefixes.iter().any(|p| envelope.topic.starts_with(p.as_str()))
            };
            if matches {
                return Ok(envelope);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics;

    #[tokio::test]
    async fn delivers_matching_topics_only() {
        let bus = MemoryBus::new();
        let sub = bus.subscriber();
        sub.subscribe("vigil.alert.").await.unwrap();

        bus.publish(Envelope::new(topics::NOTIFICATION_SENT, &1u8).unwrap())
            .await
            .unwrap();
        bus.publish(Envelope::new(topics::ALERT_GENERATED, &2u8).unwrap())
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.topic, topics::ALERT_GENERATED);
        assert_eq!(envelope.decode::<u8>().unwrap(), 2);
    }

    #[tokio::test]
    async fn multiple_subscribers_all_receive() {
        let bus = MemoryBus::new();
        let a = bus.subscriber();
        let b = bus.subscriber();
        a.subscribe("").await.unwrap();
        b.subscribe("").await.unwrap();

        bus.publish(Envelope::new("vigil.test", &7u8).unwrap())
            .await
            .unwrap();

        assert_eq!(a.recv().await.unwrap().decode::<u8>().unwrap(), 7);
        assert_eq!(b.recv().await.unwrap().decode::<u8>().unwrap(), 7);
    }
}
