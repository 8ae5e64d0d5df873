//! Time-to-live caches
//!
//! [`TtlCache`] is a generic, thread-safe key/value store where every entry
//! carries its own expiry. It is bounded: a new key arriving at capacity
//! sweeps expired entries and then evicts by policy (FIFO unless LRU is
//! selected). [`TieredCache`] layers an optional [`PersistentTier`] under a
//! string-keyed `TtlCache`.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use clinicdesk_common::cache::{CacheConfig, EvictionPolicy, TtlCache};
//!
//! let config = CacheConfig::builder()
//!     .max_size(2)
//!     .ttl(Duration::from_secs(300))
//!     .eviction_policy(EvictionPolicy::FIFO)
//!     .build();
//! let cache: TtlCache<&str, i32> = TtlCache::new(config);
//!
//! cache.set("a", 1, None);
//! cache.set("b", 2, None);
//! cache.set("c", 3, None);
//! assert_eq!(cache.get(&"a"), None);
//! assert_eq!(cache.get(&"c"), Some(3));
//! ```
//!
//! # Thread Safety
//!
//! All state sits behind one `parking_lot::Mutex`; no operation holds it
//! across an `.await`, so a cache can be shared with `Arc` between tasks.

mod config;
mod core;
mod stats;
mod tiered;

// Re-export public API
pub use core::TtlCache;

pub use config::{CacheConfig, CacheConfigBuilder, EvictionPolicy};
pub use stats::CacheStats;
pub use tiered::{MemoryTier, PersistentTier, StoreError, StoreResult, TieredCache};
