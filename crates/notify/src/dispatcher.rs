//! Per-channel notification dispatch.
//!
//! One worker per enabled channel drains due notifications in strict
//! `(priority desc, scheduled_at asc, created_at asc)` order, under a
//! token-bucket rate limit. Over-limit sends wait for a token; nothing
//! is dropped. Failures retry up to `max_retries` with `retry_delay`
//! between attempts, then the notification is marked failed and a
//! failure event is published.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vigil_bus::{topics, Envelope, EventPublisher, EventRef, NotificationFailed, NotificationSent};
use vigil_core::config::{ChannelConfig, ChannelsConfig};
use vigil_core::notification::{Channel, Notification};
use vigil_core::VigilError;

use crate::channels::build_notifier;
use crate::traits::Notifier;

const BATCH_SIZE: i64 = 64;
const IDLE_POLL: Duration = Duration::from_millis(500);

/// Store-facing seam: the durable queue the dispatcher drains.
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Due sends for a channel in dispatch order (§ ordering contract).
    async fn next_batch_due(
        &self,
        channel: Channel,
        limit: i64,
    ) -> Result<Vec<Notification>, VigilError>;

    async fn mark_sent(&self, id: Uuid, external_id: &str) -> Result<Notification, VigilError>;
    async fn mark_delivered(&self, id: Uuid) -> Result<Notification, VigilError>;
    async fn mark_retry(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<Notification, VigilError>;
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Notification, VigilError>;
}

/// Spawns and owns the per-channel workers.
pub struct NotificationDispatcher {
    workers: Vec<JoinHandle<()>>,
}

impl NotificationDispatcher {
    /// Build notifiers from config and start a worker per enabled,
    /// configured channel. Channels whose provider configuration is
    /// missing are logged and skipped.
    pub fn start(
        config: &ChannelsConfig,
        queue: Arc<dyn NotificationQueue>,
        events: Arc<dyn EventPublisher>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut workers = Vec::new();
        for channel in Channel::ALL {
            let channel_config = config.for_channel(channel).clone();
            if !channel_config.enabled {
                debug!(%channel, "channel disabled");
                continue;
            }
            match build_notifier(channel, config) {
                Ok(notifier) => {
                    let worker = ChannelWorker::new(
                        channel_config,
                        notifier,
                        Arc::clone(&queue),
                        Arc::clone(&events),
                    );
                    workers.push(tokio::spawn(worker.run(shutdown.clone())));
                }
                Err(e) => warn!(%channel, error = %e, "channel not configured; skipping"),
            }
        }
        info!(workers = workers.len(), "notification dispatcher started");
        Self { workers }
    }

    /// Start with caller-supplied notifiers (tests, custom providers).
    pub fn start_with_notifiers(
        notifiers: Vec<(ChannelConfig, Arc<dyn Notifier>)>,
        queue: Arc<dyn NotificationQueue>,
        events: Arc<dyn EventPublisher>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let workers = notifiers
            .into_iter()
            .map(|(config, notifier)| {
                let worker =
                    ChannelWorker::new(config, notifier, Arc::clone(&queue), Arc::clone(&events));
                tokio::spawn(worker.run(shutdown.clone()))
            })
            .collect();
        Self { workers }
    }

    pub async fn join(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Drains one channel.
pub struct ChannelWorker {
    channel: Channel,
    config: ChannelConfig,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn NotificationQueue>,
    events: Arc<dyn EventPublisher>,
    limiter: DefaultDirectRateLimiter,
}

impl ChannelWorker {
    pub fn new(
        config: ChannelConfig,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn NotificationQueue>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let per_minute = NonZeroU32::new(config.rate_limit_per_min.max(1))
            .expect("max(1) is non-zero");
        Self {
            channel: notifier.channel(),
            config,
            notifier,
            queue,
            events,
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(channel = %self.channel, "channel worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.drain_once(&shutdown).await {
                Ok(0) => {
                    // Idle: nap until the next poll or shutdown.
                    tokio::select! {
                        _ = tokio::time::sleep(IDLE_POLL) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() { break; }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "dispatch batch failed");
                    tokio::time::sleep(IDLE_POLL).await;
                }
            }
        }
        info!(channel = %self.channel, "channel worker stopped");
    }

    /// Process one due batch; returns how many notifications were
    /// attempted. Public so tests can single-step the worker.
    pub async fn drain_once(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<usize, VigilError> {
        let batch = self.queue.next_batch_due(self.channel, BATCH_SIZE).await?;
        let mut attempted = 0;

        for notification in batch {
            if *shutdown.borrow() {
                break;
            }
            // Idempotency belt: the queue filters these already.
            if notification.external_id.is_some() {
                continue;
            }
            // Token bucket: wait, never drop.
            self.limiter.until_ready().await;
            attempted += 1;
            self.attempt(notification).await?;
        }
        Ok(attempted)
    }

    async fn attempt(&self, notification: Notification) -> Result<(), VigilError> {
        match self.notifier.send(&notification).await {
            Ok(receipt) => {
                let mut updated = self
                    .queue
                    .mark_sent(notification.id, &receipt.external_id)
                    .await?;
                if receipt.delivered {
                    updated = self.queue.mark_delivered(notification.id).await?;
                }
                debug!(
                    channel = %self.channel,
                    notification = %notification.id,
                    external_id = %receipt.external_id,
                    "notification sent"
                );
                self.publish_sent(updated).await;
            }
            Err(e) if e.is_retryable() && notification.can_retry() => {
                let next = Utc::now()
                    + chrono::Duration::from_std(self.config.retry_delay())
                        .unwrap_or_else(|_| chrono::Duration::seconds(30));
                warn!(
                    channel = %self.channel,
                    notification = %notification.id,
                    retry = notification.retry_count + 1,
                    error = %e,
                    "send failed; scheduling retry"
                );
                self.queue
                    .mark_retry(notification.id, &e.to_string(), next)
                    .await?;
            }
            Err(e) => {
                warn!(
                    channel = %self.channel,
                    notification = %notification.id,
                    error = %e,
                    "send failed permanently"
                );
                let failed = self
                    .queue
                    .mark_failed(notification.id, &e.to_string())
                    .await?;
                self.publish_failed(failed, e.to_string()).await;
            }
        }
        Ok(())
    }

    async fn publish_sent(&self, notification: Notification) {
        let payload = NotificationSent {
            notification,
            event: EventRef::default(),
        };
        match Envelope::new(topics::NOTIFICATION_SENT, &payload) {
            Ok(envelope) => {
                if let Err(e) = self.events.publish(envelope).await {
                    warn!(error = %e, "failed to publish notification.sent");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode notification.sent"),
        }
    }

    async fn publish_failed(&self, notification: Notification, last_error: String) {
        let payload = NotificationFailed {
            notification,
            last_error,
            event: EventRef::default(),
        };
        match Envelope::new(topics::NOTIFICATION_FAILED, &payload) {
            Ok(envelope) => {
                if let Err(e) = self.events.publish(envelope).await {
                    warn!(error = %e, "failed to publish notification.failed");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode notification.failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{NotifyError, ProviderReceipt};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use vigil_bus::MemoryBus;
    use vigil_core::notification::NotificationStatus;
    use vigil_core::rule::Priority;

    // ── Mock queue: in-memory transitions mirroring the store ───────

    #[derive(Default)]
    struct MockQueue {
        items: Mutex<HashMap<Uuid, Notification>>,
    }

    impl MockQueue {
        fn insert(&self, n: Notification) {
            self.items.lock().unwrap().insert(n.id, n);
        }

        fn get(&self, id: Uuid) -> Notification {
            self.items.lock().unwrap().get(&id).unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationQueue for MockQueue {
        async fn next_batch_due(
            &self,
            channel: Channel,
            limit: i64,
        ) -> Result<Vec<Notification>, VigilError> {
            let now = Utc::now();
            let mut due: Vec<Notification> = self
                .items
                .lock()
                .unwrap()
                .values()
                .filter(|n| {
                    n.channel == channel
                        && matches!(
                            n.status,
                            NotificationStatus::Pending | NotificationStatus::Retry
                        )
                        && n.scheduled_at <= now
                        && n.external_id.is_none()
                })
                .cloned()
                .collect();
            due.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.scheduled_at.cmp(&b.scheduled_at))
                    .then(a.created_at.cmp(&b.created_at))
            });
            due.truncate(limit as usize);
            Ok(due)
        }

        async fn mark_sent(&self, id: Uuid, external_id: &str) -> Result<Notification, VigilError> {
            let mut items = self.items.lock().unwrap();
            let n = items.get_mut(&id).ok_or(VigilError::NotFound(id.to_string()))?;
            if n.status.is_terminal() {
                return Err(VigilError::Conflict("terminal".to_string()));
            }
            n.status = NotificationStatus::Sent;
            n.sent_at = Some(Utc::now());
            n.external_id = Some(external_id.to_string());
            Ok(n.clone())
        }

        async fn mark_delivered(&self, id: Uuid) -> Result<Notification, VigilError> {
            let mut items = self.items.lock().unwrap();
            let n = items.get_mut(&id).ok_or(VigilError::NotFound(id.to_string()))?;
            n.status = NotificationStatus::Delivered;
            n.delivered_at = Some(Utc::now());
            Ok(n.clone())
        }

        async fn mark_retry(
            &self,
            id: Uuid,
            error: &str,
            next_attempt_at: DateTime<Utc>,
        ) -> Result<Notification, VigilError> {
            let mut items = self.items.lock().unwrap();
            let n = items.get_mut(&id).ok_or(VigilError::NotFound(id.to_string()))?;
            assert!(n.retry_count < n.max_retries, "retry bound violated");
            n.status = NotificationStatus::Retry;
            n.retry_count += 1;
            n.last_error = Some(error.to_string());
            n.scheduled_at = next_attempt_at;
            Ok(n.clone())
        }

        async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Notification, VigilError> {
            let mut items = self.items.lock().unwrap();
            let n = items.get_mut(&id).ok_or(VigilError::NotFound(id.to_string()))?;
            n.status = NotificationStatus::Failed;
            n.failed_at = Some(Utc::now());
            n.last_error = Some(error.to_string());
            Ok(n.clone())
        }
    }

    // ── Mock notifier ───────────────────────────────────────────────

    struct MockNotifier {
        channel: Channel,
        sends: Arc<Mutex<Vec<Uuid>>>,
        fail_times: AtomicUsize,
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, n: &Notification) -> Result<ProviderReceipt, NotifyError> {
            if self.fail_times.load(Ordering::SeqCst) > 0 {
                self.fail_times.fetch_sub(1, Ordering::SeqCst);
                return Err(NotifyError::Smtp("mock transient failure".to_string()));
            }
            self.sends.lock().unwrap().push(n.id);
            Ok(ProviderReceipt::sent(format!("ext-{}", n.id)))
        }

        fn channel(&self) -> Channel {
            self.channel
        }
    }

    fn channel_config() -> ChannelConfig {
        ChannelConfig {
            enabled: true,
            rate_limit_per_min: 600,
            max_retries: 3,
            retry_delay_secs: 0,
            timeout_secs: 5,
        }
    }

    fn pending(channel: Channel, priority: Priority, age_secs: i64) -> Notification {
        let now = Utc::now();
        Notification {
            id: Uuid::new_v4(),
            alert_id: Uuid::new_v4(),
            rule_id: None,
            channel,
            recipient: "#alerts".to_string(),
            subject: "s".to_string(),
            content: "c".to_string(),
            priority,
            status: NotificationStatus::Pending,
            scheduled_at: now - chrono::Duration::seconds(age_secs),
            sent_at: None,
            delivered_at: None,
            failed_at: None,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            external_id: None,
            tracking_id: None,
            created_at: now - chrono::Duration::seconds(age_secs),
            updated_at: now,
        }
    }

    fn worker(
        queue: Arc<MockQueue>,
        fail_times: usize,
    ) -> (ChannelWorker, Arc<Mutex<Vec<Uuid>>>) {
        let sends = Arc::new(Mutex::new(Vec::new()));
        let notifier = Arc::new(MockNotifier {
            channel: Channel::Slack,
            sends: Arc::clone(&sends),
            fail_times: AtomicUsize::new(fail_times),
        });
        let events = Arc::new(MemoryBus::new());
        (
            ChannelWorker::new(channel_config(), notifier, queue, events),
            sends,
        )
    }

    #[tokio::test]
    async fn sends_in_priority_then_age_order() {
        let queue = Arc::new(MockQueue::default());
        let low = pending(Channel::Slack, Priority::Low, 30);
        let critical = pending(Channel::Slack, Priority::Critical, 10);
        let high_old = pending(Channel::Slack, Priority::High, 60);
        let high_new = pending(Channel::Slack, Priority::High, 5);
        for n in [&low, &critical, &high_old, &high_new] {
            queue.insert(n.clone());
        }

        let (worker, sends) = worker(Arc::clone(&queue), 0);
        let (_tx, shutdown) = watch::channel(false);
        worker.drain_once(&shutdown).await.unwrap();

        let order = sends.lock().unwrap().clone();
        assert_eq!(order, vec![critical.id, high_old.id, high_new.id, low.id]);
        assert_eq!(queue.get(critical.id).status, NotificationStatus::Sent);
        assert!(queue.get(critical.id).external_id.is_some());
    }

    #[tokio::test]
    async fn transient_failures_retry_then_succeed() {
        let queue = Arc::new(MockQueue::default());
        let n = pending(Channel::Slack, Priority::Medium, 1);
        queue.insert(n.clone());

        let (worker, sends) = worker(Arc::clone(&queue), 2);
        let (_tx, shutdown) = watch::channel(false);

        // Two failing attempts, then success on the third batch.
        worker.drain_once(&shutdown).await.unwrap();
        assert_eq!(queue.get(n.id).status, NotificationStatus::Retry);
        assert_eq!(queue.get(n.id).retry_count, 1);

        worker.drain_once(&shutdown).await.unwrap();
        assert_eq!(queue.get(n.id).retry_count, 2);

        worker.drain_once(&shutdown).await.unwrap();
        assert_eq!(queue.get(n.id).status, NotificationStatus::Sent);
        assert_eq!(sends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retries_exhaust_to_failed() {
        let queue = Arc::new(MockQueue::default());
        let n = pending(Channel::Slack, Priority::Medium, 1);
        queue.insert(n.clone());

        let (worker, _sends) = worker(Arc::clone(&queue), usize::MAX);
        let (_tx, shutdown) = watch::channel(false);

        for _ in 0..3 {
            worker.drain_once(&shutdown).await.unwrap();
        }
        assert_eq!(queue.get(n.id).retry_count, 3);
        // Fourth attempt: can_retry() is false, so it fails terminally.
        worker.drain_once(&shutdown).await.unwrap();
        let final_state = queue.get(n.id);
        assert_eq!(final_state.status, NotificationStatus::Failed);
        assert!(final_state.retry_count <= final_state.max_retries);
    }

    #[tokio::test]
    async fn already_sent_is_never_resent() {
        let queue = Arc::new(MockQueue::default());
        let mut n = pending(Channel::Slack, Priority::Medium, 1);
        n.external_id = Some("ext-prior".to_string());
        queue.insert(n.clone());

        let (worker, sends) = worker(Arc::clone(&queue), 0);
        let (_tx, shutdown) = watch::channel(false);
        let attempted = worker.drain_once(&shutdown).await.unwrap();
        assert_eq!(attempted, 0);
        assert!(sends.lock().unwrap().is_empty());
    }
}
