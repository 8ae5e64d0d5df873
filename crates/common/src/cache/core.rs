//! Core TTL cache implementation
//!
//! Entries carry their own time-to-live. Expired entries are treated as
//! absent and purged lazily: on access, on `cleanup_expired`, and by the
//! sweep that runs before anything is evicted at capacity.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use super::config::{CacheConfig, EvictionPolicy};
use super::stats::{CacheStats, MetricsCollector};
use crate::resilience::{Clock, SystemClock};

/// Entry stored in the cache with its expiry metadata
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
    ttl: Option<Duration>,
}

impl<V> CacheEntry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        self.ttl.map_or(true, |ttl| now.saturating_duration_since(self.stored_at) < ttl)
    }
}

/// Internal storage for cache entries
#[derive(Debug)]
struct CacheStorage<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Eviction order, front is evicted first
    order: VecDeque<K>,
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn new() -> Self {
        Self { entries: HashMap::new(), order: VecDeque::new() }
    }

    fn remove(&mut self, key: &K) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry)
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }

    fn purge_expired(&mut self, now: Instant) -> Vec<K> {
        let mut removed = Vec::new();
        self.entries.retain(|key, entry| {
            let valid = entry.is_valid(now);
            if !valid {
                removed.push(key.clone());
            }
            valid
        });
        if !removed.is_empty() {
            let entries = &self.entries;
            self.order.retain(|k| entries.contains_key(k));
        }
        removed
    }
}

/// Generic thread-safe cache with per-entry time-to-live
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// # Example
/// ```
/// use std::time::Duration;
///
/// use clinicdesk_common::cache::{CacheConfig, TtlCache};
///
/// let cache: TtlCache<String, i32> = TtlCache::new(CacheConfig::default());
/// cache.set("key".to_string(), 42, Some(Duration::from_secs(60)));
/// assert_eq!(cache.get(&"key".to_string()), Some(42));
/// ```
pub struct TtlCache<K, V, C = SystemClock>
where
    C: Clock,
{
    storage: Mutex<CacheStorage<K, V>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V, C: Clock> fmt::Debug for TtlCache<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("len", &self.storage.lock().entries.len())
            .finish_non_exhaustive()
    }
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache with the given configuration using system clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Create a new cache with a custom clock (useful for testing)
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            storage: Mutex::new(CacheStorage::new()),
            config,
            metrics: MetricsCollector::default(),
            clock,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Store a value; `ttl` falls back to the configured default
    ///
    /// A new key at capacity first sweeps expired entries, then evicts
    /// according to the eviction policy. Overwriting a live key never
    /// evicts; overwriting an expired one counts as a new insert.
    ///
    /// Returns the keys that left the cache to make room, expired ones
    /// included.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) -> Vec<K> {
        let now = self.clock.now();
        let entry = CacheEntry { value, stored_at: now, ttl: ttl.or(self.config.ttl) };
        let mut storage = self.storage.lock();
        let mut displaced = Vec::new();

        let live = storage.entries.get(&key).map(|existing| existing.is_valid(now));
        if live == Some(false) {
            storage.remove(&key);
            if self.config.track_metrics {
                self.metrics.record_expirations(1);
            }
        }

        if live == Some(true) {
            storage.entries.insert(key.clone(), entry);
            if self.config.eviction_policy == EvictionPolicy::LRU {
                storage.touch(&key);
            }
        } else {
            if let Some(max_size) = self.config.max_size {
                if max_size == 0 {
                    return displaced;
                }
                if storage.entries.len() >= max_size {
                    displaced = self.make_room(&mut storage, now, max_size);
                }
            }
            storage.entries.insert(key.clone(), entry);
            storage.order.push_back(key);
        }

        if self.config.track_metrics {
            self.metrics.record_insert();
        }
        displaced
    }

    /// Get a value if present and not expired; an expired entry is removed
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut storage = self.storage.lock();

        let valid = match storage.entries.get(key) {
            Some(entry) => entry.is_valid(now),
            None => {
                self.record_miss();
                return None;
            }
        };

        if !valid {
            storage.remove(key);
            if self.config.track_metrics {
                self.metrics.record_expirations(1);
            }
            self.record_miss();
            return None;
        }

        if self.config.eviction_policy == EvictionPolicy::LRU {
            storage.touch(key);
        }
        if self.config.track_metrics {
            self.metrics.record_hit();
        }
        storage.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Time left before the entry at `key` expires
    ///
    /// `Some(None)` for an entry without a TTL, `None` when absent or
    /// expired.
    pub fn remaining_ttl(&self, key: &K) -> Option<Option<Duration>> {
        let now = self.clock.now();
        let storage = self.storage.lock();
        let entry = storage.entries.get(key).filter(|entry| entry.is_valid(now))?;
        Some(entry.ttl.map(|ttl| ttl.saturating_sub(now.saturating_duration_since(entry.stored_at))))
    }

    /// Remove a key; returns whether it was present
    pub fn delete(&self, key: &K) -> bool {
        self.storage.lock().remove(key).is_some()
    }

    /// Remove every key matching the predicate; returns the number removed
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K) -> bool,
    {
        let mut storage = self.storage.lock();
        let before = storage.entries.len();
        storage.entries.retain(|k, _| !predicate(k));
        let removed = before - storage.entries.len();
        if removed > 0 {
            let CacheStorage { entries, order } = &mut *storage;
            order.retain(|k| entries.contains_key(k));
        }
        removed
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        let mut storage = self.storage.lock();
        storage.entries.clear();
        storage.order.clear();

        if self.config.track_metrics {
            self.metrics.reset();
        }
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.storage.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys of all valid entries in eviction order
    pub fn keys(&self) -> Vec<K> {
        let now = self.clock.now();
        let storage = self.storage.lock();
        storage
            .order
            .iter()
            .filter(|k| storage.entries.get(*k).is_some_and(|entry| entry.is_valid(now)))
            .cloned()
            .collect()
    }

    /// Remove expired entries
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        self.evict_expired().len()
    }

    /// Remove expired entries and return their keys
    pub fn evict_expired(&self) -> Vec<K> {
        let removed = self.storage.lock().purge_expired(self.clock.now());
        if !removed.is_empty() && self.config.track_metrics {
            self.metrics.record_expirations(removed.len() as u64);
        }
        removed
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len(), self.config.max_size)
    }

    fn make_room(
        &self,
        storage: &mut CacheStorage<K, V>,
        now: Instant,
        max_size: usize,
    ) -> Vec<K> {
        let mut displaced = storage.purge_expired(now);
        if !displaced.is_empty() && self.config.track_metrics {
            self.metrics.record_expirations(displaced.len() as u64);
        }

        while storage.entries.len() >= max_size {
            let Some(oldest) = storage.order.pop_front() else { break };
            if storage.entries.remove(&oldest).is_some() {
                trace!(policy = ?self.config.eviction_policy, "Evicted cache entry");
                if self.config.track_metrics {
                    self.metrics.record_eviction();
                }
                displaced.push(oldest);
            }
        }
        displaced
    }

    fn record_miss(&self) {
        if self.config.track_metrics {
            self.metrics.record_miss();
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::core.

    use super::*;
    use crate::resilience::MockClock;

    fn cache_with(config: CacheConfig) -> (TtlCache<String, i32, MockClock>, MockClock) {
        let clock = MockClock::new();
        (TtlCache::with_clock(config, clock.clone()), clock)
    }

    fn key(s: &str) -> String {
        s.to_string()
    }

    /// Validates the TTL round trip.
    ///
    /// Assertions:
    /// - A value is returned before its TTL elapses.
    /// - At exactly the TTL the entry is gone and was purged from storage.
    #[test]
    fn test_ttl_round_trip() {
        let (cache, clock) = cache_with(CacheConfig::default());

        cache.set(key("k"), 7, Some(Duration::from_millis(1000)));
        clock.advance_millis(999);
        assert_eq!(cache.get(&key("k")), Some(7));

        clock.advance_millis(1);
        assert_eq!(cache.get(&key("k")), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    /// Validates re-storing a key after it expired.
    ///
    /// Assertions:
    /// - The fresh value is readable with its new TTL.
    /// - The key moves to the back of the eviction order.
    #[test]
    fn test_set_after_expiry_is_fresh_insert() {
        let (cache, clock) = cache_with(CacheConfig::fifo(2, Duration::from_secs(60)));

        cache.set(key("a"), 1, Some(Duration::from_secs(1)));
        cache.set(key("b"), 2, None);
        clock.advance(Duration::from_secs(2));

        assert!(cache.set(key("a"), 10, None).is_empty());
        assert_eq!(cache.get(&key("a")), Some(10));
        assert_eq!(cache.remaining_ttl(&key("a")), Some(Some(Duration::from_secs(60))));

        assert_eq!(cache.set(key("c"), 3, None), vec![key("b")]);
        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.keys(), vec![key("a"), key("c")]);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_default_ttl_applies() {
        let config = CacheConfig::builder().ttl(Duration::from_secs(10)).build();
        let (cache, clock) = cache_with(config);

        cache.set(key("a"), 1, None);
        clock.advance(Duration::from_secs(10));
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let config = CacheConfig::builder().no_ttl().build();
        let (cache, clock) = cache_with(config);

        cache.set(key("a"), 1, None);
        clock.advance(Duration::from_secs(86_400));
        assert_eq!(cache.get(&key("a")), Some(1));
        assert_eq!(cache.remaining_ttl(&key("a")), Some(None));
    }

    /// Validates FIFO eviction at capacity.
    ///
    /// Assertions:
    /// - Inserting k3 into a full cache of two evicts k1.
    /// - Reading k1 before the insert does not protect it.
    #[test]
    fn test_fifo_eviction() {
        let (cache, _clock) = cache_with(CacheConfig::fifo(2, Duration::from_secs(60)));

        cache.set(key("k1"), 1, None);
        cache.set(key("k2"), 2, None);
        assert_eq!(cache.get(&key("k1")), Some(1));
        cache.set(key("k3"), 3, None);

        assert_eq!(cache.get(&key("k1")), None);
        assert_eq!(cache.get(&key("k2")), Some(2));
        assert_eq!(cache.get(&key("k3")), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_keeps_fifo_position() {
        let (cache, _clock) = cache_with(CacheConfig::fifo(2, Duration::from_secs(60)));

        cache.set(key("k1"), 1, None);
        cache.set(key("k2"), 2, None);
        cache.set(key("k1"), 10, None);
        assert_eq!(cache.len(), 2);

        cache.set(key("k3"), 3, None);
        assert_eq!(cache.get(&key("k1")), None);
        assert_eq!(cache.get(&key("k2")), Some(2));
    }

    #[test]
    fn test_lru_eviction_respects_reads() {
        let (cache, _clock) = cache_with(CacheConfig::lru(2, Duration::from_secs(60)));

        cache.set(key("k1"), 1, None);
        cache.set(key("k2"), 2, None);
        assert_eq!(cache.get(&key("k1")), Some(1));
        cache.set(key("k3"), 3, None);

        assert_eq!(cache.get(&key("k1")), Some(1));
        assert_eq!(cache.get(&key("k2")), None);
    }

    #[test]
    fn test_expired_entries_swept_before_eviction() {
        let (cache, clock) = cache_with(CacheConfig::fifo(2, Duration::from_secs(60)));

        cache.set(key("old"), 1, None);
        cache.set(key("short"), 2, Some(Duration::from_millis(10)));
        clock.advance_millis(10);
        assert_eq!(cache.set(key("new"), 3, None), vec![key("short")]);

        assert_eq!(cache.get(&key("old")), Some(1));
        assert_eq!(cache.get(&key("new")), Some(3));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let (cache, _clock) = cache_with(CacheConfig::fifo(0, Duration::from_secs(60)));
        cache.set(key("a"), 1, None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_delete_clear_and_remove_where() {
        let (cache, _clock) = cache_with(CacheConfig::default());

        cache.set(key("GET /patients"), 1, None);
        cache.set(key("GET /patients/1"), 2, None);
        cache.set(key("GET /doctors"), 3, None);

        assert!(cache.delete(&key("GET /doctors")));
        assert!(!cache.delete(&key("GET /doctors")));

        assert_eq!(cache.remove_where(|k| k.starts_with("GET /patients")), 2);
        assert!(cache.is_empty());

        cache.set(key("x"), 1, None);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().inserts, 0);
    }

    #[test]
    fn test_cleanup_expired_and_keys() {
        let (cache, clock) = cache_with(CacheConfig::default());

        cache.set(key("a"), 1, Some(Duration::from_millis(5)));
        cache.set(key("b"), 2, Some(Duration::from_millis(50)));
        cache.set(key("c"), 3, Some(Duration::from_millis(5)));
        clock.advance_millis(5);

        assert_eq!(cache.keys(), vec![key("b")]);
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remaining_ttl(&key("b")), Some(Some(Duration::from_millis(45))));
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let (cache, _clock) = cache_with(CacheConfig::default());
        cache.set(key("a"), 1, None);
        let _ = cache.get(&key("a"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.max_size, Some(100));
    }
}
