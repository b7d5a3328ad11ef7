//! Time-to-live response cache.
//!
//! [`TtlCache`] is a plain key/value map where every entry expires a fixed
//! duration after it was written. Expired entries behave exactly like missing
//! ones and are dropped the next time they are read or the cache is written.
//! There is no capacity bound.
//!
//! Time is read from `tokio::time::Instant`, so tests can drive expiry with a
//! paused runtime clock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) <= ttl
    }
}

/// A thread-safe map whose entries expire after `ttl`.
///
/// # Examples
///
/// ```
/// use fetchkit::TtlCache;
/// use std::time::Duration;
///
/// let cache = TtlCache::new(Duration::from_secs(30));
/// cache.set("user:42", "Ada".to_string());
/// assert_eq!(cache.get("user:42").as_deref(), Some("Ada"));
///
/// cache.invalidate("user:42");
/// assert!(cache.get("user:42").is_none());
/// ```
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value for `key` if it was set no longer than `ttl` ago.
    ///
    /// An expired entry is removed as part of the lookup.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        let value = entries
            .get(key)
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            entries.remove(key);
        }
        value
    }

    /// Inserts or replaces `key`, restarting its lifetime.
    ///
    /// Expired entries are swept on every write.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        entries.retain(|_, entry| entry.is_fresh(ttl, now));
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    /// Removes `key`. Returns `true` if a live entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .remove(key)
            .is_some_and(|entry| entry.is_fresh(self.ttl, now))
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drops all expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh(ttl, now));
        before - entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|entry| entry.is_fresh(self.ttl, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panic while holding the lock cannot leave an entry half-written, so a
    // poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
