use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::BusError;

/// Broadcast side of the bus: topic-filtered fan-out to subscribers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an envelope. Subscribers filter on its topic.
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError>;
}

/// Blanket impl so `Arc<dyn EventPublisher>` composes freely.
#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        (**self).publish(envelope).await
    }
}

/// Receive side: prefix-filtered subscription over the bus.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Add a topic-prefix subscription; empty string means everything.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError>;

    /// Next envelope matching any active subscription. Blocks.
    async fn recv(&self) -> Result<Envelope, BusError>;
}
