//! PUB/SUB forwarding broker.
//!
//! Central rendezvous so many publishers (engine, management surface,
//! upstream detectors) and many subscribers can meet without knowing
//! each other's endpoints:
//!
//! - publishers connect to the **frontend** (broker binds a SUB socket
//!   subscribed to everything)
//! - subscribers connect to the **backend** (broker binds a PUB socket)
//!
//! `zeromq` 0.4 has no XPUB/XSUB types, so the proxy is emulated with
//! PUB+SUB, same as the rest of the stack.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket};

use crate::error::BusError;
use crate::transport::Transport;

/// Forwarding counters, cheap enough to keep always-on.
#[derive(Debug, Default)]
pub struct BrokerStats {
    pub forwarded: AtomicU64,
    pub topic_counts: Mutex<HashMap<String, u64>>,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Publishers connect here; the broker binds SUB.
    pub frontend: Transport,
    /// Subscribers connect here; the broker binds PUB.
    pub backend: Transport,
}

pub struct Broker {
    config: BrokerConfig,
    stats: Arc<BrokerStats>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            stats: Arc::new(BrokerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<BrokerStats> {
        Arc::clone(&self.stats)
    }

    /// Bind both sides and forward until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        let mut frontend = SubSocket::new();
        frontend.bind(&self.config.frontend.endpoint()).await?;
        frontend.subscribe("").await?;

        let mut backend = PubSocket::new();
        backend.bind(&self.config.backend.endpoint()).await?;

        info!(
            frontend = %self.config.frontend,
            backend = %self.config.backend,
            "broker started"
        );

        loop {
            tokio::select! {
                message = frontend.recv() => {
                    match message {
                        Ok(message) => {
                            let topic = message
                                .iter()
                                .next()
                                .map(|f| String::from_utf8_lossy(f.as_ref()).into_owned())
                                .unwrap_or_default();
                            if let Err(e) = backend.send(message).await {
                                warn!(error = %e, "forward failed");
                                continue;
                            }
                            self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
                            let mut counts = self.stats.topic_counts.lock().await;
                            *counts.entry(topic.clone()).or_insert(0) += 1;
                            drop(counts);
                            debug!(topic = %topic, "forwarded");
                        }
                        Err(e) => {
                            warn!(error = %e, "frontend receive failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("broker stopped");
                        return Ok(());
                    }
                }
            }
        }
    }
}
