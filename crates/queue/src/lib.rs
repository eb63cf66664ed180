//! Input-side event source: pull detection events off the bus with
//! ack/nack semantics so the engine gets at-least-once processing.

pub mod consumer;
pub mod error;
pub mod memory;
pub mod parser;
pub mod zmq;

pub use consumer::{EventSource, SourceHealth, SourceMessage};
pub use error::SourceError;
pub use memory::MemoryEventSource;
pub use parser::parse_event;
pub use zmq::ZmqEventSource;
