//! Per-rule throttle map: minimum interval between action runs.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// First execution in the window; the timestamp was recorded.
    Allowed,
    /// Window not yet elapsed; the recorded timestamp is unchanged.
    Suppressed,
}

/// Last-execution timestamps keyed by `rule_id:rule_name`.
#[derive(Default)]
pub struct ThrottleMap {
    inner: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl ThrottleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an execution for `key` may proceed at `now`.
    ///
    /// Allowed executions record `now`; suppressed ones leave the
    /// original timestamp in place, so the window is anchored at the
    /// first allowed match.
    pub fn check_and_record(
        &self,
        key: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> ThrottleDecision {
        let mut map = self.inner.write().expect("throttle map poisoned");
        match map.get(key) {
            Some(last) if now.signed_duration_since(*last) < window => {
                ThrottleDecision::Suppressed
            }
            _ => {
                map.insert(key.to_string(), now);
                ThrottleDecision::Allowed
            }
        }
    }

    /// The recorded last-execution timestamp, if any.
    pub fn last_execution(&self, key: &str) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .expect("throttle map poisoned")
            .get(key)
            .copied()
    }

    /// Drop entries older than `retain`, bounding the map.
    pub fn prune(&self, retain: Duration, now: DateTime<Utc>) {
        self.inner
            .write()
            .expect("throttle map poisoned")
            .retain(|_, last| now.signed_duration_since(*last) < retain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppresses_within_window() {
        let map = ThrottleMap::new();
        let window = Duration::minutes(5);
        let start = Utc::now();

        assert_eq!(
            map.check_and_record("r1:burst", window, start),
            ThrottleDecision::Allowed
        );
        // Nine more matches inside the window all suppress.
        for i in 1..10 {
            let at = start + Duration::seconds(i * 20);
            assert_eq!(
                map.check_and_record("r1:burst", window, at),
                ThrottleDecision::Suppressed
            );
        }
        // The anchor is the first match, untouched by suppressions.
        assert_eq!(map.last_execution("r1:burst"), Some(start));

        // Past the window the next match is allowed again.
        let later = start + Duration::minutes(6);
        assert_eq!(
            map.check_and_record("r1:burst", window, later),
            ThrottleDecision::Allowed
        );
        assert_eq!(map.last_execution("r1:burst"), Some(later));
    }

    #[test]
    fn keys_are_independent() {
        let map = ThrottleMap::new();
        let window = Duration::minutes(5);
        let now = Utc::now();
        assert_eq!(map.check_and_record("a", window, now), ThrottleDecision::Allowed);
        assert_eq!(map.check_and_record("b", window, now), ThrottleDecision::Allowed);
    }

    #[test]
    fn prune_drops_stale_entries() {
        let map = ThrottleMap::new();
        let now = Utc::now();
        map.check_and_record("old", Duration::minutes(1), now - Duration::hours(2));
        map.check_and_record("fresh", Duration::minutes(1), now);
        map.prune(Duration::hours(1), now);
        assert!(map.last_execution("old").is_none());
        assert!(map.last_execution("fresh").is_some());
    }
}
