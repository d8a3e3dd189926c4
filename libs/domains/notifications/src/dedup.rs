//! Idempotency-key cache.
//!
//! Remembers recently delivered keys for a fixed TTL so a redelivered
//! envelope is not mailed twice. In memory and per process: a restart or a
//! second worker in the group does not share it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// TTL cache of idempotency keys.
#[derive(Debug)]
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Record `key`. Returns `false` when it was already recorded within the TTL.
    pub fn insert(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        seen.retain(|_, at| now.duration_since(*at) < self.ttl);

        if seen.contains_key(key) {
            return false;
        }
        seen.insert(key.to_string(), now);
        true
    }

    /// Forget `key`, e.g. after a failed delivery so a redelivery can retry.
    pub fn remove(&self, key: &str) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_within_ttl() {
        let cache = DedupCache::new(Duration::from_secs(60));

        assert!(cache.insert("otp-1"));
        assert!(!cache.insert("otp-1"));
        assert!(cache.insert("otp-2"));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_expires() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.insert("otp-1"));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.insert("otp-1"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_allows_retry() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.insert("otp-1"));

        cache.remove("otp-1");

        assert!(cache.insert("otp-1"));
    }
}
