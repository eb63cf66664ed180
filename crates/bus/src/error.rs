use thiserror::Error;

/// Errors in the messaging layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("malformed frame: {0}")]
    Frame(String),

    #[error("endpoint error: {0}")]
    Endpoint(String),

    #[error("bus closed")]
    Closed,
}
