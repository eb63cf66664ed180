//! Event consumer: pull, evaluate, dispatch, then acknowledge.
//!
//! Messages are acked only after evaluation and dispatch complete, so a
//! crash mid-event means redelivery (at-least-once). Poisoned messages
//! (unparseable, or past the redelivery cap) are acked away with a log
//! line instead of looping forever.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_core::config::EngineConfig;
use vigil_queue::{parse_event, EventSource, SourceMessage};
use vigil_rules::RuleEvaluator;

use crate::actions::ActionDispatcher;

/// Monotonic counters exposed through engine stats.
#[derive(Debug, Default)]
pub struct ConsumerStats {
    pub processed: AtomicU64,
    pub matched: AtomicU64,
    pub failed: AtomicU64,
    pub poisoned: AtomicU64,
}

pub struct EventConsumer {
    source: Arc<dyn EventSource>,
    evaluator: Arc<RuleEvaluator>,
    actions: Arc<ActionDispatcher>,
    config: EngineConfig,
    stats: Arc<ConsumerStats>,
}

impl EventConsumer {
    pub fn new(
        source: Arc<dyn EventSource>,
        evaluator: Arc<RuleEvaluator>,
        actions: Arc<ActionDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            evaluator,
            actions,
            config,
            stats: Arc::new(ConsumerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.stats)
    }

    /// Main loop; returns on shutdown.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!("event consumer started");
        while !*shutdown.borrow() {
            let batch = match self
                .source
                .receive(
                    self.config.batch_size as usize,
                    self.config.processing_interval(),
                )
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "receive failed; backing off");
                    tokio::time::sleep(self.config.retry_delay()).await;
                    continue;
                }
            };

            for message in batch {
                if *shutdown.borrow() {
                    // Unacked messages redeliver after restart.
                    let _ = self.source.nack(&message.receipt).await;
                    continue;
                }
                self.process(message, &shutdown).await;
            }
        }
        info!("event consumer stopped");
    }

    async fn process(&self, message: SourceMessage, shutdown: &watch::Receiver<bool>) {
        if message.attempt_count > self.config.max_retries + 1 {
            warn!(
                message = %message.id,
                attempts = message.attempt_count,
                "dropping poisoned message"
            );
            self.stats.poisoned.fetch_add(1, Ordering::Relaxed);
            let _ = self.source.ack(&message.receipt).await;
            return;
        }

        let event = match parse_event(&message) {
            Ok(event) => event,
            Err(e) => {
                // Parse failures are permanent; redelivery cannot help.
                warn!(message = %message.id, error = %e, "unparseable event dropped");
                self.stats.poisoned.fetch_add(1, Ordering::Relaxed);
                let _ = self.source.ack(&message.receipt).await;
                return;
            }
        };

        debug!(kind = %event.kind, message = %message.id, "evaluating event");
        let results = self.evaluator.evaluate_event(&event, None, shutdown).await;

        if *shutdown.borrow() {
            // Cancelled mid-evaluation: leave the message for redelivery
            // rather than ack a half-processed event.
            let _ = self.source.nack(&message.receipt).await;
            return;
        }

        let matched = results.len();
        let succeeded = self.actions.dispatch_all(&results, &event).await;

        if succeeded < matched {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            // Some dispatch failed (e.g. store outage): redeliver.
            if let Err(e) = self.source.nack(&message.receipt).await {
                warn!(message = %message.id, error = %e, "nack failed");
            }
            return;
        }

        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        self.stats.matched.fetch_add(matched as u64, Ordering::Relaxed);
        if let Err(e) = self.source.ack(&message.receipt).await {
            warn!(message = %message.id, error = %e, "ack failed");
        }
    }
}
