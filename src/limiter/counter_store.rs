use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::QuotaSettings;

/// Outcome of a check-and-increment.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Allowed,
    Denied,
}

/// The fixed interval a key's count accumulates over. Ids are monotonic for
/// one owner tenure only; they restart when ownership moves.
#[derive(Clone, Debug, Serialize)]
pub struct Window {
    pub id: u64,
    pub started_at: DateTime<Utc>,
}

/// Per-key counters for the current window. Entries never survive a window
/// boundary, and they exist only on the node holding the live singleton.
///
/// There is no interior locking here: the store is owned by a single
/// `LimiterService` task, which is the serialization point for every
/// increment and reset.
#[derive(Debug)]
pub struct CounterStore {
    quota: QuotaSettings,
    window: Window,
    counts: HashMap<String, u32>,
}

impl CounterStore {
    pub fn new(quota: QuotaSettings) -> Self {
        Self {
            quota,
            window: Window {
                id: 0,
                started_at: Utc::now(),
            },
            counts: HashMap::new(),
        }
    }

    /// Count this call and report whether it fit the quota. The increment
    /// always happens: denied calls still count, so retrying after a denial
    /// never resets a caller's own tally.
    pub fn increment(&mut self, key: &str) -> Verdict {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        if *count > self.quota.max_per_window {
            Verdict::Denied
        } else {
            Verdict::Allowed
        }
    }

    pub fn calls_remaining(&self, key: &str) -> u32 {
        let used = self.counts.get(key).copied().unwrap_or(0);
        self.quota.max_per_window.saturating_sub(used)
    }

    /// Drop all counters and begin the next window.
    pub fn reset(&mut self) {
        self.counts.clear();
        self.window = Window {
            id: self.window.id + 1,
            started_at: Utc::now(),
        };
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_max(max_per_window: u32) -> CounterStore {
        CounterStore::new(QuotaSettings {
            max_per_window,
            window_seconds: 60,
        })
    }

    #[test]
    fn allows_up_to_max_then_denies() {
        let mut store = store_with_max(3);
        for _ in 0..3 {
            assert_eq!(store.increment("a1"), Verdict::Allowed);
        }
        assert_eq!(store.increment("a1"), Verdict::Denied);
        assert_eq!(store.increment("a1"), Verdict::Denied);
    }

    #[test]
    fn denied_calls_still_count() {
        let mut store = store_with_max(1);
        assert_eq!(store.increment("a1"), Verdict::Allowed);
        assert_eq!(store.increment("a1"), Verdict::Denied);
        // a retry after the denial sees no freed-up quota
        assert_eq!(store.calls_remaining("a1"), 0);
        assert_eq!(store.increment("a1"), Verdict::Denied);
    }

    #[test]
    fn reset_clears_counters_and_advances_window() {
        let mut store = store_with_max(2);
        assert_eq!(store.increment("a1"), Verdict::Allowed);
        assert_eq!(store.increment("a1"), Verdict::Allowed);
        assert_eq!(store.increment("a1"), Verdict::Denied);
        assert_eq!(store.window().id, 0);

        store.reset();
        assert_eq!(store.window().id, 1);
        assert!(store.is_empty());
        assert_eq!(store.increment("a1"), Verdict::Allowed);
    }

    #[test]
    fn keys_are_isolated() {
        let mut store = store_with_max(1);
        assert_eq!(store.increment("a1"), Verdict::Allowed);
        assert_eq!(store.increment("a1"), Verdict::Denied);
        assert_eq!(store.increment("b1"), Verdict::Allowed);
        assert_eq!(store.calls_remaining("b1"), 0);
        assert_eq!(store.calls_remaining("c1"), 1);
    }

    #[test]
    fn zero_quota_denies_immediately() {
        let mut store = store_with_max(0);
        assert_eq!(store.increment("a1"), Verdict::Denied);
        assert_eq!(store.calls_remaining("a1"), 0);
    }
}
