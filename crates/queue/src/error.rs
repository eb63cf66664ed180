//! Event-source error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("message parse error: {0}")]
    Parse(String),

    #[error("acknowledge error: {0}")]
    Ack(String),

    #[error("source closed")]
    Closed,
}

impl From<vigil_bus::BusError> for SourceError {
    fn from(err: vigil_bus::BusError) -> Self {
        match err {
            vigil_bus::BusError::Closed => SourceError::Closed,
            other => SourceError::Connection(other.to_string()),
        }
    }
}
