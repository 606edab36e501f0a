//! Bounded in-process cache (L1)

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::expiry_index::ExpiryIndex;

/// Longest TTL an entry is scheduled with
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Configuration for the local tier
#[derive(Debug, Clone)]
pub struct LocalCacheConfig {
    /// Default time-to-live for entries set without an explicit TTL
    pub ttl: Duration,
    /// Maximum number of entries (0 disables the tier)
    pub size: usize,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            size: 1000,
        }
    }
}

impl LocalCacheConfig {
    /// Create config with specific capacity
    pub fn with_capacity(size: usize) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    /// Set the default TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Vec<u8>>,
    expiry: ExpiryIndex,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        for key in self.expiry.drain_expired(now) {
            self.entries.remove(&key);
        }
    }
}

/// Capacity and TTL bounded map of encoded values
///
/// The local tier is advisory: a hit is served without asking the remote
/// tier, so its TTL bounds how stale a process can be. When full, the entry
/// closest to expiring is evicted (not strict LRU).
///
/// Cloning creates a new handle to the SAME underlying map.
#[derive(Debug, Clone)]
pub struct LocalCache {
    inner: Arc<Mutex<Inner>>,
    config: LocalCacheConfig,
}

impl LocalCache {
    /// Create a new local cache
    pub fn new(config: LocalCacheConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::with_capacity(config.size.min(10_000)),
                expiry: ExpiryIndex::new(),
            })),
            config,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(LocalCacheConfig::default())
    }

    /// Configured default TTL
    pub fn default_ttl(&self) -> Duration {
        self.config.ttl
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.config.size
    }

    /// Get an entry, if present and not expired
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.entries.get(key).cloned()
    }

    /// Insert or overwrite an entry
    ///
    /// `ttl = None` uses the configured default. Returns the key evicted to
    /// make room, if any.
    pub fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Option<String> {
        if self.config.size == 0 {
            return None;
        }

        let now = Instant::now();
        let deadline = now + ttl.unwrap_or(self.config.ttl).min(MAX_TTL);

        let mut inner = self.inner.lock();
        inner.purge_expired(now);

        let mut evicted = None;
        if !inner.entries.contains_key(key) && inner.entries.len() >= self.config.size {
            if let Some(victim) = inner.expiry.pop_earliest() {
                inner.entries.remove(&victim);
                evicted = Some(victim);
            }
        }

        inner.expiry.schedule(key.to_string(), deadline);
        inner.entries.insert(key.to_string(), value);
        evicted
    }

    /// Remove an entry, returning `true` if it existed
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        inner.expiry.remove(key);
        inner.entries.remove(key).is_some()
    }

    /// Remove every entry
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.expiry.clear();
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.purge_expired(Instant::now());
        inner.entries.len()
    }

    /// Check if the cache holds no live entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
