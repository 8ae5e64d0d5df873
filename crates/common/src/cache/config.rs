//! Cache configuration types and builder patterns

use std::time::Duration;

/// Eviction policy applied when a new key arrives at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// First In First Out - evicts the oldest-inserted entry; reads and
    /// overwrites do not change an entry's position
    #[default]
    FIFO,
    /// Least Recently Used - reads and overwrites move an entry to the back
    LRU,
}

/// Configuration for cache behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries (None = unlimited)
    pub max_size: Option<usize>,

    /// Default time-to-live for entries (None = no expiration)
    pub ttl: Option<Duration>,

    /// Eviction policy when max_size is reached
    pub eviction_policy: EvictionPolicy,

    /// Whether to collect hit/miss/eviction counters
    pub track_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: Some(100),
            ttl: Some(Duration::from_secs(5 * 60)),
            eviction_policy: EvictionPolicy::FIFO,
            track_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Bounded FIFO cache with a default TTL
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use clinicdesk_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::fifo(100, Duration::from_secs(300));
    /// assert_eq!(config.max_size, Some(100));
    /// ```
    pub fn fifo(max_size: usize, ttl: Duration) -> Self {
        Self { max_size: Some(max_size), ttl: Some(ttl), ..Self::default() }
    }

    /// Bounded LRU cache with a default TTL
    pub fn lru(max_size: usize, ttl: Duration) -> Self {
        Self {
            max_size: Some(max_size),
            ttl: Some(ttl),
            eviction_policy: EvictionPolicy::LRU,
            ..Self::default()
        }
    }
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum number of entries
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = Some(size);
        self
    }

    /// Remove the size bound
    pub fn unbounded(mut self) -> Self {
        self.config.max_size = None;
        self
    }

    /// Set the default time-to-live for entries
    pub fn ttl(mut self, duration: Duration) -> Self {
        self.config.ttl = Some(duration);
        self
    }

    /// Entries never expire unless `set` is given an explicit TTL
    pub fn no_ttl(mut self) -> Self {
        self.config.ttl = None;
        self
    }

    /// Set eviction policy
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    /// Enable or disable metrics tracking
    pub fn track_metrics(mut self, enabled: bool) -> Self {
        self.config.track_metrics = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CacheConfig {
        self.config
    }
}
