use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_CAPACITY: usize = 2048;
const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

/// Bounded, TTL'd cache of recently-seen inbound message ids.
///
/// A message id is a duplicate iff it was admitted within the last `ttl`.
/// Past that window it is admitted again and its timestamp refreshed. An
/// empty message id is never considered a duplicate.
pub struct DedupCache {
    seen: Mutex<HashMap<String, Instant>>,
    capacity: usize,
    ttl: Duration,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            capacity,
            ttl,
        }
    }

    /// Returns `true` if `message_id` was already admitted within the TTL
    /// window (i.e. this delivery is a duplicate). Otherwise records it and
    /// returns `false`.
    pub fn is_duplicate(&self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return false;
        }

        let now = Instant::now();
        let mut seen = self.seen.lock();

        if let Some(first_seen) = seen.get(message_id) {
            if now.duration_since(*first_seen) < self.ttl {
                return true;
            }
        }

        seen.insert(message_id.to_string(), now);
        self.evict_if_needed(&mut seen, now);
        false
    }

    /// Drop expired entries, then — if still over capacity — evict the
    /// least-recently-admitted entries until back under budget.
    fn evict_if_needed(&self, seen: &mut HashMap<String, Instant>, now: Instant) {
        if seen.len() <= self.capacity {
            return;
        }

        let ttl = self.ttl;
        seen.retain(|_, ts| now.duration_since(*ts) < ttl);

        if seen.len() > self.capacity {
            let overflow = seen.len() - self.capacity;
            let mut oldest: Vec<(String, Instant)> =
                seen.iter().map(|(k, v)| (k.clone(), *v)).collect();
            oldest.sort_by_key(|(_, ts)| *ts);
            for (key, _) in oldest.into_iter().take(overflow) {
                seen.remove(&key);
            }
        }
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_id_is_never_duplicate() {
        let cache = DedupCache::new();
        assert!(!cache.is_duplicate(""));
        assert!(!cache.is_duplicate(""));
    }

    #[test]
    fn repeat_within_ttl_is_duplicate() {
        let cache = DedupCache::with_capacity_and_ttl(10, Duration::from_secs(60));
        assert!(!cache.is_duplicate("om_1"));
        assert!(cache.is_duplicate("om_1"));
        assert!(cache.is_duplicate("om_1"));
    }

    #[test]
    fn repeat_after_ttl_is_admitted_again() {
        let cache = DedupCache::with_capacity_and_ttl(10, Duration::from_millis(20));
        assert!(!cache.is_duplicate("om_1"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.is_duplicate("om_1"));
    }

    #[test]
    fn distinct_ids_are_independent() {
        let cache = DedupCache::new();
        assert!(!cache.is_duplicate("om_1"));
        assert!(!cache.is_duplicate("om_2"));
        assert!(cache.is_duplicate("om_1"));
    }

    #[test]
    fn bounded_capacity_evicts_oldest() {
        let cache = DedupCache::with_capacity_and_ttl(4, Duration::from_secs(3600));
        for i in 0..4 {
            assert!(!cache.is_duplicate(&format!("om_{i}")));
        }
        // One more insertion should push the cache over capacity and evict
        // the oldest entry (om_0).
        assert!(!cache.is_duplicate("om_4"));
        assert!(
            !cache.is_duplicate("om_0"),
            "om_0 should have been evicted and re-admitted, not treated as duplicate"
        );
    }
}
