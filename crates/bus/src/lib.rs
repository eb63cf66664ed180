//! Event-bus plumbing: envelope format, publisher/subscriber traits,
//! ZeroMQ PUB/SUB implementations, and an in-process bus for tests.

pub mod broker;
pub mod envelope;
pub mod error;
pub mod events;
pub mod memory;
pub mod pubsub;
pub mod topics;
pub mod traits;
pub mod transport;

pub use envelope::Envelope;
pub use error::BusError;
pub use events::*;
pub use memory::MemoryBus;
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
