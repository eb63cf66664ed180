//! Engine wiring: build every component from configuration and drive
//! the leaf-first shutdown sequence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vigil_bus::{EventPublisher, Transport, ZmqPublisher, ZmqSubscriber};
use vigil_core::config::Config;
use vigil_core::VigilError;
use vigil_notify::NotificationDispatcher;
use vigil_queue::{EventSource, ZmqEventSource};
use vigil_rules::{memo, EvaluationPool, RuleCache, RuleEvaluator};
use vigil_store::Store;

use crate::actions::ActionDispatcher;
use crate::adapters::{StoreNotificationQueue, StoreRuleSource};
use crate::consumer::EventConsumer;
use crate::lifecycle::LifecycleManager;
use crate::scheduler::Scheduler;

/// Memo purge cadence; coarse on purpose, TTL filtering happens on read.
const MEMO_PURGE_INTERVAL: Duration = Duration::from_secs(30);

pub struct Engine {
    consumer: Arc<EventConsumer>,
    scheduler: Arc<Scheduler>,
    dispatcher: NotificationDispatcher,
    background: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
}

impl Engine {
    /// Wire the full engine against ZMQ bus endpoints and Postgres.
    pub async fn build(config: Config) -> Result<Self, VigilError> {
        let store = Store::connect(&config.postgres).await.map_err(VigilError::from)?;

        let input = Transport::parse(&config.bus.input_endpoint)
            .map_err(|e| VigilError::Fatal(e.to_string()))?;
        let output = Transport::parse(&config.bus.output_endpoint)
            .map_err(|e| VigilError::Fatal(e.to_string()))?;

        let subscriber = ZmqSubscriber::connect(&input)
            .await
            .map_err(|e| VigilError::Transient(e.to_string()))?;
        let source = ZmqEventSource::start(subscriber, &config.bus.input_topics)
            .await
            .map_err(|e| VigilError::Transient(e.to_string()))?;
        // Both sides go through the broker: SUB connects to its
        // backend, PUB to its frontend.
        let publisher = ZmqPublisher::connect(&output)
            .await
            .map_err(|e| VigilError::Transient(e.to_string()))?;

        Self::assemble(config, store, Arc::new(source), Arc::new(publisher))
    }

    /// Wire against caller-supplied transport (tests, embedded use).
    pub fn assemble(
        config: Config,
        store: Store,
        source: Arc<dyn EventSource>,
        events: Arc<dyn EventPublisher>,
    ) -> Result<Self, VigilError> {
        let (shutdown_tx, shutdown) = watch::channel(false);

        // Rules: cache + bounded pool + evaluator.
        let cache = Arc::new(RuleCache::new());
        let rule_source = Arc::new(StoreRuleSource::new(store.rules()));
        let pool = Arc::new(EvaluationPool::start(
            config.rules.pool_size(),
            shutdown.clone(),
        ));
        let evaluator = Arc::new(RuleEvaluator::new(
            Arc::clone(&cache),
            Arc::clone(&pool),
            config.rules.clone(),
        ));

        // Lifecycle + actions.
        let lifecycle = Arc::new(LifecycleManager::new(
            store.alerts(),
            Arc::clone(&events),
            config.lifecycle.clone(),
            config.security.hash_salt.clone(),
        ));
        let actions = Arc::new(ActionDispatcher::new(
            Arc::clone(&lifecycle),
            store.notifications(),
            store.policies(),
            config.channels.clone(),
        ));

        // Consumer.
        let consumer = Arc::new(EventConsumer::new(
            source,
            Arc::clone(&evaluator),
            actions,
            config.engine.clone(),
        ));

        // Notification dispatch.
        let queue = Arc::new(StoreNotificationQueue::new(store.notifications()));
        let dispatcher = NotificationDispatcher::start(
            &config.channels,
            queue,
            Arc::clone(&events),
            shutdown.clone(),
        );

        // Scheduler.
        let scheduler = Arc::new(Scheduler::new(
            lifecycle,
            store.alerts(),
            store.notifications(),
            store.advisory(),
            Arc::clone(&cache),
            rule_source,
            config.scheduler.clone(),
            config.rules.clone(),
        ));

        // Memo purge.
        let mut background = Vec::new();
        if let Some(memo_cache) = evaluator.memo() {
            background.push(tokio::spawn(memo::run_purge_loop(
                memo_cache,
                MEMO_PURGE_INTERVAL,
                shutdown.clone(),
            )));
        }

        Ok(Self {
            consumer,
            scheduler,
            dispatcher,
            background,
            shutdown_tx,
            shutdown,
            grace: Duration::from_secs(config.engine.shutdown_grace_secs),
        })
    }

    /// Run until the shutdown signal fires, then drain leaf-first.
    pub async fn run(self) {
        let consumer = Arc::clone(&self.consumer);
        let consumer_shutdown = self.shutdown.clone();
        let consumer_task = tokio::spawn(async move { consumer.run(consumer_shutdown).await });

        let scheduler = Arc::clone(&self.scheduler);
        let scheduler_shutdown = self.shutdown.clone();
        let scheduler_task = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "shutdown signal listener failed");
        }
        info!("shutdown signal received; draining");
        let _ = self.shutdown_tx.send(true);

        // Leaf-first: consumer stops pulling first; pool workers exit
        // on the same signal; then dispatcher, scheduler, and the
        // background loops drain, all within the grace window.
        let drain = async {
            let _ = consumer_task.await;
            self.dispatcher.join().await;
            let _ = scheduler_task.await;
            for task in self.background {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(self.grace, drain).await.is_err() {
            warn!(grace = ?self.grace, "grace window elapsed; forcing exit");
        }
        info!("engine stopped");
    }
}
