//! Bounded worker pool for rule evaluation.
//!
//! The task queue is capped at `workers × 2`; submission awaits a free
//! slot, which is the backpressure path up to the event consumer.
//! Workers yield between conditions so cancellation and per-rule
//! timeouts get their suspension points.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::debug;

use vigil_expr::Env;

use crate::compiled::CompiledRule;
use crate::error::RulesError;

/// One evaluation job: run every condition of `rule` against `env`.
pub struct EvalRequest {
    pub rule: Arc<CompiledRule>,
    pub env: Env,
    pub timeout: Duration,
    pub reply: oneshot::Sender<EvalOutcome>,
}

/// What a worker reports back.
#[derive(Debug)]
pub struct EvalOutcome {
    /// All conditions held (AND-joined).
    pub matched: Result<bool, RulesError>,
    pub duration: Duration,
}

pub struct EvaluationPool {
    tx: mpsc::Sender<EvalRequest>,
    workers: Vec<JoinHandle<()>>,
}

impl EvaluationPool {
    /// Start `workers` workers sharing a queue bounded at `workers × 2`.
    pub fn start(workers: usize, shutdown: watch::Receiver<bool>) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<EvalRequest>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));

        let handles = (0..workers)
            .map(|worker_id| {
                let rx = Arc::clone(&rx);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker_id, rx, shutdown))
            })
            .collect();

        Self { tx, workers: handles }
    }

    /// Submit a job. Blocks while the queue is full; fails only when the
    /// pool has shut down.
    pub async fn submit(&self, request: EvalRequest) -> Result<(), RulesError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| RulesError::PoolClosed)
    }

    /// Close the queue and wait for workers to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<EvalRequest>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        // Take the next request while holding the receiver lock only
        // for the dequeue itself.
        let request = {
            let mut rx = rx.lock().await;
            tokio::select! {
                req = rx.recv() => req,
                _ = wait_shutdown(&mut shutdown) => None,
            }
        };
        let Some(request) = request else {
            debug!(worker_id, "evaluation worker stopping");
            return;
        };

        let started = Instant::now();
        let matched = tokio::select! {
            outcome = tokio::time::timeout(
                request.timeout,
                evaluate_conditions(&request.rule, &request.env),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(RulesError::Timeout(request.timeout)),
            },
            _ = wait_shutdown(&mut shutdown) => Err(RulesError::Cancelled),
        };

        // The submitter may have abandoned the result (cancellation);
        // a dropped receiver is not an error.
        let _ = request.reply.send(EvalOutcome {
            matched,
            duration: started.elapsed(),
        });
    }
}

/// Resolve when shutdown is signalled. A dropped sender counts as
/// shutdown; spurious wakes are re-polled.
pub(crate) async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// AND-join all condition programs, yielding between conditions so the
/// timeout and shutdown branches can fire mid-rule.
async fn evaluate_conditions(rule: &CompiledRule, env: &Env) -> Result<bool, RulesError> {
    for program in &rule.programs {
        if !program.eval_bool(env)? {
            return Ok(false);
        }
        tokio::task::yield_now().await;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{compile_rule, test_support::rule_with_conditions};
    use serde_json::json;

    fn env_with(event: serde_json::Value) -> Env {
        let mut env = Env::new();
        env.insert("event", event);
        env
    }

    async fn run_one(pool: &EvaluationPool, rule: Arc<CompiledRule>, env: Env) -> EvalOutcome {
        let (reply, rx) = oneshot::channel();
        pool.submit(EvalRequest {
            rule,
            env,
            timeout: Duration::from_millis(500),
            reply,
        })
        .await
        .unwrap();
        rx.await.unwrap()
    }

    #[tokio::test]
    async fn evaluates_and_joins_conditions() {
        let (_tx, shutdown) = watch::channel(false);
        let pool = EvaluationPool::start(2, shutdown);

        let rule = Arc::new(
            compile_rule(rule_with_conditions(
                "both",
                &["event.a > 1", "event.b == \"x\""],
            ))
            .unwrap(),
        );

        let outcome = run_one(&pool, Arc::clone(&rule), env_with(json!({"a": 2, "b": "x"}))).await;
        assert!(outcome.matched.unwrap());

        let outcome = run_one(&pool, rule, env_with(json!({"a": 2, "b": "y"}))).await;
        assert!(!outcome.matched.unwrap());
    }

    #[tokio::test]
    async fn runtime_error_fails_the_rule_only() {
        let (_tx, shutdown) = watch::channel(false);
        let pool = EvaluationPool::start(1, shutdown);

        let rule = Arc::new(
            compile_rule(rule_with_conditions("div", &["10 / event.d > 1"])).unwrap(),
        );
        let outcome = run_one(&pool, rule, env_with(json!({"d": 0}))).await;
        assert!(outcome.matched.is_err());

        // Pool still serves after the failure.
        let ok = Arc::new(compile_rule(rule_with_conditions("ok", &["1 == 1"])).unwrap());
        let outcome = run_one(&pool, ok, env_with(json!({}))).await;
        assert!(outcome.matched.unwrap());
    }

    #[tokio::test]
    async fn shutdown_drains_workers() {
        let (tx, shutdown) = watch::channel(false);
        let pool = EvaluationPool::start(2, shutdown);
        tx.send(true).unwrap();
        pool.shutdown().await;
    }
}
