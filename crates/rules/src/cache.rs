//! Compiled-rule cache with atomic refresh.
//!
//! Readers snapshot the current `Arc` under a briefly-held read lock;
//! refresh builds a whole new map and swaps it in one write. A reader
//! always sees either the pre-refresh or post-refresh set, never a mix.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use vigil_core::rule::Rule;

use crate::compiled::{compile_rule, CompiledRule};
use crate::error::RulesError;

/// Where the cache pulls enabled rules from (the store in production,
/// a fixture in tests).
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<Rule>, RulesError>;
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStats {
    /// Rules compiled and now serving.
    pub loaded: usize,
    /// Rules excluded because compilation failed.
    pub failed: usize,
}

type Snapshot = Arc<HashMap<Uuid, Arc<CompiledRule>>>;

pub struct RuleCache {
    inner: RwLock<Snapshot>,
}

impl RuleCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// Reload and recompile all enabled rules, swapping the set atomically.
    ///
    /// A rule that fails to compile is logged and excluded until a later
    /// refresh; its siblings keep serving.
    pub async fn refresh(&self, source: &dyn RuleSource) -> Result<RefreshStats, RulesError> {
        let rules = source.list_enabled().await?;
        let total = rules.len();

        let mut compiled = HashMap::with_capacity(total);
        let mut failed = 0usize;
        for rule in rules {
            let id = rule.id;
            let name = rule.name.clone();
            match compile_rule(rule) {
                Ok(c) => {
                    compiled.insert(id, Arc::new(c));
                }
                Err(e) => {
                    failed += 1;
                    warn!(rule = %name, error = %e, "rule excluded from evaluation");
                }
            }
        }

        let loaded = compiled.len();
        *self.inner.write().expect("rule cache poisoned") = Arc::new(compiled);
        info!(loaded, failed, total, "rule cache refreshed");
        Ok(RefreshStats { loaded, failed })
    }

    /// Cheap snapshot of the current compiled set.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().expect("rule cache poisoned").clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<CompiledRule>> {
        self.snapshot().get(&id).cloned()
    }

    /// Number of rules currently serving (the cache-size stat).
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::test_support::rule_with_conditions;

    struct FixedSource(Vec<Rule>);

    #[async_trait]
    impl RuleSource for FixedSource {
        async fn list_enabled(&self) -> Result<Vec<Rule>, RulesError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn refresh_swaps_atomically() {
        let cache = RuleCache::new();
        let first = rule_with_conditions("a", &["event.x > 1"]);
        let source = FixedSource(vec![first.clone()]);
        cache.refresh(&source).await.unwrap();

        let before = cache.snapshot();
        assert_eq!(before.len(), 1);

        // Swap in a different set; the old snapshot is untouched.
        let source = FixedSource(vec![
            rule_with_conditions("b", &["event.x > 2"]),
            rule_with_conditions("c", &["event.x > 3"]),
        ]);
        cache.refresh(&source).await.unwrap();

        assert_eq!(before.len(), 1, "old snapshot must stay intact");
        assert_eq!(cache.len(), 2);
        assert!(cache.get(first.id).is_none());
    }

    #[tokio::test]
    async fn compile_failure_excludes_only_the_bad_rule() {
        let cache = RuleCache::new();
        let source = FixedSource(vec![
            rule_with_conditions("good-1", &["event.amount > 10"]),
            rule_with_conditions("bad", &["amount >"]),
            rule_with_conditions("good-2", &["event.amount < 5"]),
        ]);
        let stats = cache.refresh(&source).await.unwrap();

        assert_eq!(stats, RefreshStats { loaded: 2, failed: 1 });
        // The cache-size stat equals enabled_rules − 1.
        assert_eq!(cache.len(), 2);
    }
}
