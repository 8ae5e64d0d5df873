//! Memory cache mirrored into a persistent key/value tier
//!
//! Writes go to both tiers. Reads check memory first and fall back to the
//! persistent tier, rehydrating memory with whatever TTL the stored entry
//! has left. Entries are stored as JSON envelopes carrying wall-clock
//! timestamps so they stay meaningful across processes. Last write wins.
//!
//! The persistent tier shares the memory bound. Keys evicted from memory
//! are deleted from the tier, and a tier that still holds more than
//! `max_size` keys in this namespace drops keys not resident in memory,
//! oldest first.
//!
//! The persistent tier is best effort: its failures are logged and treated
//! as misses, never surfaced to callers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::core::TtlCache;
use super::stats::CacheStats;
use crate::resilience::{Clock, SystemClock};

/// Errors raised by a [`PersistentTier`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be read or written
    #[error("persistent store unavailable: {message}")]
    Unavailable { message: String },

    /// A cache entry could not be encoded or decoded
    #[error("invalid cache envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// String key/value store partitioned by namespace
pub trait PersistentTier: Send + Sync {
    fn load(&self, namespace: &str, key: &str) -> StoreResult<Option<String>>;

    /// Insert or replace
    fn store(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    fn keys(&self, namespace: &str) -> StoreResult<Vec<String>>;

    /// Remove every key in the namespace; returns the number removed
    fn clear(&self, namespace: &str) -> StoreResult<usize>;
}

/// Process-local [`PersistentTier`]
///
/// Sharing one `Arc<MemoryTier>` between caches behaves like two processes
/// sharing a persistent store.
#[derive(Debug, Default)]
pub struct MemoryTier {
    namespaces: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistentTier for MemoryTier {
    fn load(&self, namespace: &str, key: &str) -> StoreResult<Option<String>> {
        Ok(self.namespaces.lock().get(namespace).and_then(|ns| ns.get(key)).cloned())
    }

    fn store(&self, namespace: &str, key: &str, value: &str) -> StoreResult<()> {
        self.namespaces
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        Ok(self.namespaces.lock().get_mut(namespace).is_some_and(|ns| ns.remove(key).is_some()))
    }

    fn keys(&self, namespace: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .namespaces
            .lock()
            .get(namespace)
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn clear(&self, namespace: &str) -> StoreResult<usize> {
        Ok(self.namespaces.lock().remove(namespace).map_or(0, |ns| ns.len()))
    }
}

/// Persisted form of one cache entry
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<V> {
    value: V,
    stored_at_ms: u64,
    ttl_ms: Option<u64>,
}

impl<V> Envelope<V> {
    /// Remaining lifetime at `now_ms`; `None` once expired
    fn remaining(&self, now_ms: u64) -> Option<Option<Duration>> {
        match self.ttl_ms {
            None => Some(None),
            Some(ttl_ms) => {
                let age = now_ms.saturating_sub(self.stored_at_ms);
                (age < ttl_ms).then(|| Some(Duration::from_millis(ttl_ms - age)))
            }
        }
    }
}

/// [`TtlCache`] keyed by strings with an optional persistent mirror
pub struct TieredCache<V, C = SystemClock>
where
    C: Clock,
{
    memory: TtlCache<String, V, C>,
    tier: Option<Arc<dyn PersistentTier>>,
    namespace: String,
    clock: C,
}

impl<V, C: Clock> fmt::Debug for TieredCache<V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredCache")
            .field("namespace", &self.namespace)
            .field("persistent", &self.tier.is_some())
            .field("memory", &self.memory)
            .finish()
    }
}

impl<V> TieredCache<V, SystemClock>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Memory-only cache
    pub fn memory_only(config: CacheConfig, namespace: impl Into<String>) -> Self {
        Self::with_clock(config, namespace, None, SystemClock)
    }

    /// Cache mirrored into `tier`
    pub fn persistent(
        config: CacheConfig,
        namespace: impl Into<String>,
        tier: Arc<dyn PersistentTier>,
    ) -> Self {
        Self::with_clock(config, namespace, Some(tier), SystemClock)
    }
}

impl<V, C> TieredCache<V, C>
where
    V: Clone + Serialize + DeserializeOwned,
    C: Clock + Clone,
{
    pub fn with_clock(
        config: CacheConfig,
        namespace: impl Into<String>,
        tier: Option<Arc<dyn PersistentTier>>,
        clock: C,
    ) -> Self {
        Self {
            memory: TtlCache::with_clock(config, clock.clone()),
            tier,
            namespace: namespace.into(),
            clock,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_persistent(&self) -> bool {
        self.tier.is_some()
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let owned = key.to_string();
        if let Some(value) = self.memory.get(&owned) {
            return Some(value);
        }

        let tier = self.tier.as_ref()?;
        let raw = match tier.load(&self.namespace, key) {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(namespace = %self.namespace, key, %error, "Persistent cache read failed");
                return None;
            }
        };

        let envelope: Envelope<V> = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(namespace = %self.namespace, key, %error, "Discarding unreadable cache entry");
                self.remove_persisted(tier.as_ref(), key);
                return None;
            }
        };

        match envelope.remaining(self.clock.millis_since_epoch()) {
            Some(remaining) => {
                debug!(namespace = %self.namespace, key, "Rehydrated cache entry from persistent tier");
                let displaced = self.memory.set(owned, envelope.value.clone(), remaining);
                self.prune_tier(tier.as_ref(), &displaced);
                Some(envelope.value)
            }
            None => {
                self.remove_persisted(tier.as_ref(), key);
                None
            }
        }
    }

    /// Store in memory and mirror into the persistent tier
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        let effective_ttl = ttl.or(self.memory.config().ttl);

        let Some(tier) = &self.tier else {
            self.memory.set(key.to_string(), value, effective_ttl);
            return;
        };

        let envelope = Envelope {
            value: &value,
            stored_at_ms: self.clock.millis_since_epoch(),
            ttl_ms: effective_ttl.map(|ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        };
        let written = serde_json::to_string(&envelope)
            .map_err(StoreError::from)
            .and_then(|raw| tier.store(&self.namespace, key, &raw));
        if let Err(error) = written {
            warn!(namespace = %self.namespace, key, %error, "Persistent cache write failed");
        }

        let displaced = self.memory.set(key.to_string(), value, effective_ttl);
        self.prune_tier(tier.as_ref(), &displaced);
    }

    pub fn delete(&self, key: &str) -> bool {
        let in_memory = self.memory.delete(&key.to_string());
        let persisted = match &self.tier {
            Some(tier) => self.remove_persisted(tier.as_ref(), key),
            None => false,
        };
        in_memory || persisted
    }

    /// Remove every key matching the predicate from both tiers
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let mut removed: HashSet<String> =
            self.memory.keys().into_iter().filter(|k| predicate(k)).collect();
        self.memory.remove_where(|k| predicate(k));

        if let Some(tier) = &self.tier {
            match tier.keys(&self.namespace) {
                Ok(keys) => {
                    for key in keys.into_iter().filter(|k| predicate(k)) {
                        if self.remove_persisted(tier.as_ref(), &key) {
                            removed.insert(key);
                        }
                    }
                }
                Err(error) => {
                    warn!(namespace = %self.namespace, %error, "Persistent cache scan failed");
                }
            }
        }

        removed.len()
    }

    pub fn clear(&self) {
        self.memory.clear();
        if let Some(tier) = &self.tier {
            if let Err(error) = tier.clear(&self.namespace) {
                warn!(namespace = %self.namespace, %error, "Persistent cache clear failed");
            }
        }
    }

    /// Entries held in memory
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    /// Purge expired entries from memory and their persisted copies
    ///
    /// A persisted copy rewritten since by another cache is left alone.
    pub fn cleanup_expired(&self) -> usize {
        let expired = self.memory.evict_expired();
        if let Some(tier) = &self.tier {
            let now_ms = self.clock.millis_since_epoch();
            for key in &expired {
                let live = match tier.load(&self.namespace, key) {
                    Ok(Some(raw)) => serde_json::from_str::<Envelope<serde_json::Value>>(&raw)
                        .ok()
                        .and_then(|envelope| envelope.remaining(now_ms))
                        .is_some(),
                    Ok(None) => true,
                    Err(error) => {
                        warn!(namespace = %self.namespace, key, %error, "Persistent cache read failed");
                        true
                    }
                };
                if !live {
                    self.remove_persisted(tier.as_ref(), key);
                }
            }
        }
        expired.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Drop displaced keys from the tier and hold it to the memory bound
    fn prune_tier(&self, tier: &dyn PersistentTier, displaced: &[String]) {
        for key in displaced {
            debug!(namespace = %self.namespace, key = %key, "Dropping evicted entry from persistent tier");
            self.remove_persisted(tier, key);
        }

        let Some(max_size) = self.memory.config().max_size else { return };
        let persisted = match tier.keys(&self.namespace) {
            Ok(keys) => keys,
            Err(error) => {
                warn!(namespace = %self.namespace, %error, "Persistent cache scan failed");
                return;
            }
        };
        if persisted.len() <= max_size {
            return;
        }

        let resident: HashSet<String> = self.memory.keys().into_iter().collect();
        let mut excess = persisted.len() - max_size;
        for key in persisted.iter().filter(|k| !resident.contains(*k)) {
            if excess == 0 {
                break;
            }
            if self.remove_persisted(tier, key) {
                excess -= 1;
            }
        }
    }

    fn remove_persisted(&self, tier: &dyn PersistentTier, key: &str) -> bool {
        tier.remove(&self.namespace, key).unwrap_or_else(|error| {
            warn!(namespace = %self.namespace, key, %error, "Persistent cache delete failed");
            false
        })
    }
}
