//! TTL-bounded memoization of evaluation outcomes.
//!
//! Keyed by (rule id, canonical event fingerprint). Entries past their
//! TTL are ignored on read and dropped by the periodic purge.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use uuid::Uuid;

use vigil_core::event::Event;

const DEFAULT_CAPACITY: usize = 8192;

struct MemoEntry {
    outcome: bool,
    stored_at: Instant,
}

pub struct MemoCache {
    inner: Mutex<LruCache<(Uuid, u64), MemoEntry>>,
    ttl: Duration,
}

impl MemoCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Cached boolean outcome, if present and fresh.
    pub fn get(&self, rule_id: Uuid, event_fp: u64) -> Option<bool> {
        let mut cache = self.inner.lock().expect("memo cache poisoned");
        match cache.get(&(rule_id, event_fp)) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.outcome),
            Some(_) => {
                cache.pop(&(rule_id, event_fp));
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, rule_id: Uuid, event_fp: u64, outcome: bool) {
        let mut cache = self.inner.lock().expect("memo cache poisoned");
        cache.put(
            (rule_id, event_fp),
            MemoEntry {
                outcome,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every expired entry. Called from the purge loop.
    pub fn purge_expired(&self) -> usize {
        let mut cache = self.inner.lock().expect("memo cache poisoned");
        let expired: Vec<(Uuid, u64)> = cache
            .iter()
            .filter(|(_, entry)| entry.stored_at.elapsed() >= self.ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            cache.pop(key);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("memo cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodic purge loop for an evaluator-owned memo cache; runs until
/// the shutdown flag flips (or its sender drops).
pub async fn run_purge_loop(
    memo: std::sync::Arc<MemoCache>,
    every: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = memo.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "memo cache purge");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Canonical fingerprint of an event for memo keying.
///
/// serde_json maps serialize with sorted keys, so two payloads with the
/// same fields in different insertion order hash identically.
pub fn event_fingerprint(event: &Event) -> u64 {
    let mut hasher = DefaultHasher::new();
    event.kind.as_str().hash(&mut hasher);
    event.payload.to_string().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use vigil_core::event::EventKind;

    #[test]
    fn hit_and_miss() {
        let memo = MemoCache::new(Duration::from_secs(60));
        let rule = Uuid::new_v4();
        assert_eq!(memo.get(rule, 42), None);

        memo.insert(rule, 42, true);
        assert_eq!(memo.get(rule, 42), Some(true));
        assert_eq!(memo.get(rule, 43), None);
        assert_eq!(memo.get(Uuid::new_v4(), 42), None);
    }

    #[test]
    fn expired_entries_are_ignored() {
        let memo = MemoCache::new(Duration::ZERO);
        let rule = Uuid::new_v4();
        memo.insert(rule, 1, true);
        assert_eq!(memo.get(rule, 1), None);
    }

    #[test]
    fn purge_drops_expired() {
        let memo = MemoCache::new(Duration::ZERO);
        memo.insert(Uuid::new_v4(), 1, true);
        memo.insert(Uuid::new_v4(), 2, false);
        assert_eq!(memo.purge_expired(), 2);
        assert!(memo.is_empty());
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = Event::new(
            EventKind::AnomalyDetected,
            json!({"a": 1, "b": 2}),
            Utc::now(),
        );
        let b = Event::new(
            EventKind::AnomalyDetected,
            json!({"b": 2, "a": 1}),
            Utc::now(),
        );
        assert_eq!(event_fingerprint(&a), event_fingerprint(&b));

        let c = Event::new(
            EventKind::AnomalyDetected,
            json!({"a": 1, "b": 3}),
            Utc::now(),
        );
        assert_ne!(event_fingerprint(&a), event_fingerprint(&c));
    }
}
