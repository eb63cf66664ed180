//! ZeroMQ PUB/SUB implementations of the bus traits.
//!
//! Envelopes travel as two-frame messages: the topic (for SUB-side
//! prefix filtering) followed by the MessagePack envelope.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::traits::{EventPublisher, EventSubscriber};
use crate::transport::Transport;

/// PUB socket bound (or connected) to the output endpoint.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    /// Bind the publisher; subscribers connect to us.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        info!(endpoint = %transport.endpoint(), "binding PUB socket");
        socket.bind(&transport.endpoint()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    /// Connect to a broker frontend instead of binding.
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = PubSocket::new();
        info!(endpoint = %transport.endpoint(), "connecting PUB socket");
        socket.connect(&transport.endpoint()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<(), BusError> {
        let topic = envelope.topic.clone();
        let bytes = envelope.to_bytes()?;

        let mut message = ZmqMessage::from(topic.as_str());
        message.push_back(bytes.into());

        let mut socket = self.socket.lock().await;
        socket.send(message).await?;
        debug!(topic = %topic, "published envelope");
        Ok(())
    }
}

/// SUB socket connected to the input endpoint.
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, BusError> {
        let mut socket = SubSocket::new();
        info!(endpoint = %transport.endpoint(), "connecting SUB socket");
        socket.connect(&transport.endpoint()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        let mut socket = self.socket.lock().await;
        socket.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed");
        Ok(())
    }

    async fn recv(&self) -> Result<Envelope, BusError> {
        let mut socket = self.socket.lock().await;
        let message = socket.recv().await?;

        // Expect [topic, envelope]; tolerate a single combined frame.
        let frames: Vec<_> = message.iter().collect();
        let envelope_frame = match frames.len() {
            0 => return Err(BusError::Frame("empty message".to_string())),
            1 => frames[0].as_ref(),
            _ => frames[1].as_ref(),
        };
        let envelope = Envelope::from_bytes(envelope_frame)?;
        debug!(topic = %envelope.topic, "received envelope");
        Ok(envelope)
    }
}
