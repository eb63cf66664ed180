//! Periodic sweeps: expiry, escalation, retention, and rule reload.
//!
//! Every sweep takes a Postgres advisory lock keyed by its name, so
//! overlapping runs (slow sweep, second engine instance) are skipped
//! rather than doubled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use vigil_core::config::{RulesConfig, SchedulerConfig};
use vigil_rules::{RuleCache, RuleSource};
use vigil_store::{AdvisoryLock, AlertRepo, NotificationRepo};

use crate::lifecycle::LifecycleManager;

const EXPIRY_SWEEP: &str = "vigil.sweep.expiry";
const ESCALATION_SWEEP: &str = "vigil.sweep.escalation";
const RETENTION_SWEEP: &str = "vigil.sweep.retention";
const RULE_RELOAD_SWEEP: &str = "vigil.sweep.rule_reload";

pub struct Scheduler {
    lifecycle: Arc<LifecycleManager>,
    alerts: AlertRepo,
    notifications: NotificationRepo,
    advisory: AdvisoryLock,
    cache: Arc<RuleCache>,
    rule_source: Arc<dyn RuleSource>,
    config: SchedulerConfig,
    rules_config: RulesConfig,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<LifecycleManager>,
        alerts: AlertRepo,
        notifications: NotificationRepo,
        advisory: AdvisoryLock,
        cache: Arc<RuleCache>,
        rule_source: Arc<dyn RuleSource>,
        config: SchedulerConfig,
        rules_config: RulesConfig,
    ) -> Self {
        Self {
            lifecycle,
            alerts,
            notifications,
            advisory,
            cache,
            rule_source,
            config,
            rules_config,
        }
    }

    /// Drive all four sweeps on independent intervals until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut expiry = interval(self.config.expiry_interval_secs);
        let mut escalation = interval(self.config.escalation_interval_secs);
        let mut retention = interval(self.config.retention_interval_secs);
        let mut reload = interval(self.rules_config.reload_interval_secs);

        // Load rules once at startup so the evaluator is never empty.
        self.reload_rules().await;

        info!("scheduler started");
        loop {
            tokio::select! {
                _ = expiry.tick() => self.sweep_expiry().await,
                _ = escalation.tick() => self.sweep_escalation().await,
                _ = retention.tick() => self.sweep_retention().await,
                _ = reload.tick() => self.reload_rules().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    async fn sweep_expiry(&self) {
        let Some(guard) = self.try_lock(EXPIRY_SWEEP).await else {
            return;
        };
        match self.lifecycle.sweep_expired().await {
            Ok(count) if count > 0 => info!(count, "expiry sweep"),
            Ok(_) => debug!("expiry sweep: nothing due"),
            Err(e) => warn!(error = %e, "expiry sweep failed"),
        }
        self.release(guard).await;
    }

    async fn sweep_escalation(&self) {
        let Some(guard) = self.try_lock(ESCALATION_SWEEP).await else {
            return;
        };
        match self.lifecycle.sweep_escalations().await {
            Ok(count) if count > 0 => info!(count, "escalation sweep"),
            Ok(_) => debug!("escalation sweep: nothing due"),
            Err(e) => warn!(error = %e, "escalation sweep failed"),
        }
        self.release(guard).await;
    }

    async fn sweep_retention(&self) {
        let Some(guard) = self.try_lock(RETENTION_SWEEP).await else {
            return;
        };
        match self
            .alerts
            .cleanup_older_than(self.config.alert_retention_days)
            .await
        {
            Ok(deleted) if deleted > 0 => info!(deleted, "alert retention cleanup"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "alert retention cleanup failed"),
        }
        match self
            .notifications
            .cleanup_older_than(self.config.notification_retention_days)
            .await
        {
            Ok(deleted) if deleted > 0 => info!(deleted, "notification retention cleanup"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "notification retention cleanup failed"),
        }
        self.release(guard).await;
    }

    async fn reload_rules(&self) {
        let Some(guard) = self.try_lock(RULE_RELOAD_SWEEP).await else {
            return;
        };
        if let Err(e) = self.cache.refresh(self.rule_source.as_ref()).await {
            warn!(error = %e, "rule reload failed; keeping previous set");
        }
        self.release(guard).await;
    }

    async fn try_lock(&self, name: &str) -> Option<vigil_store::locks::SweepGuard> {
        match self.advisory.try_acquire(name).await {
            Ok(Some(guard)) => Some(guard),
            Ok(None) => {
                debug!(sweep = name, "already running elsewhere; skipping");
                None
            }
            Err(e) => {
                warn!(sweep = name, error = %e, "advisory lock failed");
                None
            }
        }
    }

    async fn release(&self, guard: vigil_store::locks::SweepGuard) {
        if let Err(e) = guard.release().await {
            warn!(error = %e, "sweep lock release failed");
        }
    }
}

fn interval(secs: u64) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker
}
