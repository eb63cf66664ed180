//! Event → rule fan-out.
//!
//! Snapshots the compiled rule set, builds one evaluation environment
//! per rule, and runs conditions on the bounded pool. Failures stay
//! local: a broken rule is logged and its siblings keep evaluating.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use vigil_core::config::RulesConfig;
use vigil_core::event::Event;
use vigil_core::rule::ActionSpec;
use vigil_expr::Env;

use crate::cache::RuleCache;
use crate::compiled::CompiledRule;
use crate::memo::{event_fingerprint, MemoCache};
use crate::pool::{EvalOutcome, EvalRequest, EvaluationPool};

/// A matched rule, ready for the action dispatcher.
#[derive(Debug, Clone)]
pub struct EvaluationResult {
    pub rule_id: Uuid,
    pub rule_name: String,
    pub matched: bool,
    /// The compiled rule, shared with the cache snapshot.
    pub rule: Arc<CompiledRule>,
    /// The rule's actions, in declaration order.
    pub actions: Vec<ActionSpec>,
    pub duration: Duration,
    /// Environment snapshot the conditions saw (the event payload).
    pub event_payload: Value,
}

pub struct RuleEvaluator {
    cache: Arc<RuleCache>,
    pool: Arc<EvaluationPool>,
    memo: Option<Arc<MemoCache>>,
    config: RulesConfig,
}

impl RuleEvaluator {
    pub fn new(cache: Arc<RuleCache>, pool: Arc<EvaluationPool>, config: RulesConfig) -> Self {
        let memo = config
            .cache_enabled
            .then(|| Arc::new(MemoCache::new(config.cache_ttl())));
        Self {
            cache,
            pool,
            memo,
            config,
        }
    }

    /// Shared memo handle, e.g. for the periodic purge loop.
    pub fn memo(&self) -> Option<Arc<MemoCache>> {
        self.memo.clone()
    }

    /// Evaluate one event against every cached rule, returning only the
    /// matches. Respects memoized outcomes and abandons cleanly when
    /// `shutdown` flips mid-flight.
    pub async fn evaluate_event(
        &self,
        event: &Event,
        enrichment: Option<Value>,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<EvaluationResult> {
        let snapshot = self.cache.snapshot();
        if snapshot.is_empty() {
            return Vec::new();
        }
        let event_fp = event_fingerprint(event);
        let enrichment = enrichment.unwrap_or_else(|| json!({}));

        let mut results = Vec::new();
        let mut pending: Vec<(Arc<CompiledRule>, oneshot::Receiver<EvalOutcome>)> = Vec::new();

        for compiled in snapshot.values() {
            // Memo hit: reuse the boolean without touching the pool.
            if let Some(memo) = &self.memo {
                if let Some(outcome) = memo.get(compiled.rule.id, event_fp) {
                    if outcome {
                        results.push(self.result_for(compiled, Duration::ZERO, event));
                    }
                    continue;
                }
            }

            let env = build_env(event, compiled, &enrichment);
            let (reply, rx) = oneshot::channel();
            let request = EvalRequest {
                rule: Arc::clone(compiled),
                env,
                timeout: self.config.evaluation_timeout(),
                reply,
            };
            if self.pool.submit(request).await.is_err() {
                warn!(rule = %compiled.rule.name, "evaluation pool closed; abandoning event");
                return results;
            }

            if self.config.parallel_evaluation {
                pending.push((Arc::clone(compiled), rx));
            } else {
                // Sequential mode: settle each rule before the next.
                self.collect_one(compiled, rx, event_fp, event, &mut results, shutdown)
                    .await;
            }
        }

        for (compiled, rx) in pending {
            self.collect_one(&compiled, rx, event_fp, event, &mut results, shutdown)
                .await;
            if *shutdown.borrow() {
                break;
            }
        }

        results
    }

    async fn collect_one(
        &self,
        compiled: &Arc<CompiledRule>,
        rx: oneshot::Receiver<EvalOutcome>,
        event_fp: u64,
        event: &Event,
        results: &mut Vec<EvaluationResult>,
        shutdown: &watch::Receiver<bool>,
    ) {
        let mut shutdown = shutdown.clone();
        let outcome = tokio::select! {
            outcome = rx => outcome,
            _ = crate::pool::wait_shutdown(&mut shutdown) => {
                debug!(rule = %compiled.rule.name, "abandoning in-flight evaluation");
                return;
            }
        };

        match outcome {
            Ok(EvalOutcome { matched: Ok(matched), duration }) => {
                if let Some(memo) = &self.memo {
                    memo.insert(compiled.rule.id, event_fp, matched);
                }
                if matched {
                    results.push(self.result_for(compiled, duration, event));
                }
            }
            Ok(EvalOutcome { matched: Err(e), .. }) => {
                // Errors and timeouts fail this rule only.
                warn!(rule = %compiled.rule.name, error = %e, "rule evaluation failed");
            }
            Err(_) => {
                debug!(rule = %compiled.rule.name, "evaluation dropped during shutdown");
            }
        }
    }

    fn result_for(
        &self,
        compiled: &Arc<CompiledRule>,
        duration: Duration,
        event: &Event,
    ) -> EvaluationResult {
        EvaluationResult {
            rule_id: compiled.rule.id,
            rule_name: compiled.rule.name.clone(),
            matched: true,
            rule: Arc::clone(compiled),
            actions: compiled.rule.actions.clone(),
            duration,
            event_payload: event.payload.clone(),
        }
    }
}

/// The fixed environment surface rules evaluate against.
fn build_env(event: &Event, compiled: &CompiledRule, enrichment: &Value) -> Env {
    let now = Utc::now();
    let mut env = Env::new();
    env.insert("event", event.payload.clone());
    env.insert("timestamp", json!(event.occurred_at.to_rfc3339()));
    env.insert(
        "metadata",
        serde_json::to_value(&compiled.rule.metadata).unwrap_or_else(|_| json!({})),
    );
    env.insert("now", json!(now.to_rfc3339()));
    env.insert("today", json!(now.date_naive().to_string()));
    env.insert(
        "yesterday",
        json!((now - ChronoDuration::days(1)).date_naive().to_string()),
    );
    env.insert("history", enrichment.clone());
    env
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{RuleCache, RuleSource};
    use crate::compiled::test_support::rule_with_conditions;
    use crate::error::RulesError;
    use async_trait::async_trait;
    use vigil_core::config::RulesConfig;
    use vigil_core::event::EventKind;
    use vigil_core::rule::Rule;

    struct FixedSource(Vec<Rule>);

    #[async_trait]
    impl RuleSource for FixedSource {
        async fn list_enabled(&self) -> Result<Vec<Rule>, RulesError> {
            Ok(self.0.clone())
        }
    }

    fn test_config() -> RulesConfig {
        RulesConfig {
            reload_interval_secs: 60,
            evaluation_timeout_ms: 500,
            parallel_evaluation: true,
            cache_enabled: true,
            cache_ttl_secs: 60,
            max_workers: 4,
            worker_factor: 2,
        }
    }

    async fn evaluator_with_rules(rules: Vec<Rule>) -> (RuleEvaluator, watch::Receiver<bool>) {
        let cache = Arc::new(RuleCache::new());
        cache.refresh(&FixedSource(rules)).await.unwrap();
        let (tx, shutdown) = watch::channel(false);
        // Keep the sender alive for the test's lifetime.
        Box::leak(Box::new(tx));
        let pool = Arc::new(EvaluationPool::start(2, shutdown.clone()));
        (RuleEvaluator::new(cache, pool, test_config()), shutdown)
    }

    fn anomaly_event(payload: Value) -> Event {
        Event::new(EventKind::AnomalyDetected, payload, Utc::now())
    }

    #[tokio::test]
    async fn returns_only_matches() {
        let (evaluator, shutdown) = evaluator_with_rules(vec![
            rule_with_conditions("hits", &["event.amount > 100"]),
            rule_with_conditions("misses", &["event.amount > 100000"]),
        ])
        .await;

        let event = anomaly_event(json!({"amount": 500}));
        let results = evaluator.evaluate_event(&event, None, &shutdown).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_name, "hits");
        assert!(results[0].matched);
        assert!(!results[0].actions.is_empty());
    }

    #[tokio::test]
    async fn broken_rule_does_not_abort_siblings() {
        let (evaluator, shutdown) = evaluator_with_rules(vec![
            rule_with_conditions("works", &["event.n > 1"]),
            rule_with_conditions("divides-by-zero", &["10 / event.zero > 1"]),
        ])
        .await;

        let event = anomaly_event(json!({"n": 2, "zero": 0}));
        let results = evaluator.evaluate_event(&event, None, &shutdown).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule_name, "works");
    }

    #[tokio::test]
    async fn memoizes_outcomes() {
        let (evaluator, shutdown) =
            evaluator_with_rules(vec![rule_with_conditions("memoed", &["event.x == 1"])]).await;

        let event = anomaly_event(json!({"x": 1}));
        let first = evaluator.evaluate_event(&event, None, &shutdown).await;
        assert_eq!(first.len(), 1);
        assert!(first[0].duration > Duration::ZERO);

        // Second pass hits the memo: still a match, zero work.
        let second = evaluator.evaluate_event(&event, None, &shutdown).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].duration, Duration::ZERO);
        assert_eq!(evaluator.memo().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enrichment_is_visible_as_history() {
        let (evaluator, shutdown) = evaluator_with_rules(vec![rule_with_conditions(
            "uses-history",
            &["history.avg_amount < event.amount"],
        )])
        .await;

        let event = anomaly_event(json!({"amount": 900}));
        let results = evaluator
            .evaluate_event(&event, Some(json!({"avg_amount": 100})), &shutdown)
            .await;
        assert_eq!(results.len(), 1);
    }
}
