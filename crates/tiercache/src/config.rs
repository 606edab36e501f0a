//! Configuration for the tiered cache

use std::time::Duration;

use tiercache_storage::LocalCacheConfig;

/// Namespace, defaults and write policy
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prepended to every remote key
    pub prefix: String,
    /// TTL used when a write doesn't give one
    pub default_expire: Duration,
    /// Sanitize parameter values before deriving keys
    pub force_validate: bool,
    /// Count hits and misses in the remote tier
    pub enable_stats: bool,
    /// Encrypt payloads stored remotely
    pub encrypt_data: bool,
    /// Key version; bumping it orphans every existing entry
    pub version: String,
    /// Largest payload accepted by `set`, in bytes
    pub size_limit: usize,
    /// Secret for key digests and payload encryption
    pub app_key: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "app_local_cache:".to_string(),
            default_expire: Duration::from_secs(300),
            force_validate: true,
            enable_stats: false,
            encrypt_data: true,
            version: "1.0".to_string(),
            size_limit: 1024 * 1024,
            app_key: None,
        }
    }
}

impl CacheConfig {
    /// Config namespaced as `{app}_{env}_cache:`
    ///
    /// The app name is lowercased and spaces become underscores.
    pub fn for_app(app: &str, env: &str) -> Self {
        Self {
            prefix: format!("{}_{}_cache:", app.to_lowercase().replace(' ', "_"), env),
            ..Default::default()
        }
    }

    /// Set the key prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the application secret
    pub fn app_key(mut self, key: impl Into<String>) -> Self {
        self.app_key = Some(key.into());
        self
    }

    /// Set the default TTL
    pub fn default_expire(mut self, ttl: Duration) -> Self {
        self.default_expire = ttl;
        self
    }

    /// Enable or disable payload encryption
    pub fn encrypt_data(mut self, enabled: bool) -> Self {
        self.encrypt_data = enabled;
        self
    }

    /// Enable or disable hit/miss counters
    pub fn enable_stats(mut self, enabled: bool) -> Self {
        self.enable_stats = enabled;
        self
    }
}

/// Distributed lock behaviour
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease length
    pub lease_expire: Duration,
    /// Acquire attempts before failing open
    pub retry_times: u32,
    /// Base delay of the exponential backoff
    pub retry_delay: Duration,
    /// Renew held leases in the background
    pub enable_extend: bool,
    /// How often a held lease is renewed
    pub extend_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_expire: Duration::from_secs(5),
            retry_times: 3,
            retry_delay: Duration::from_millis(100),
            enable_extend: true,
            extend_interval: Duration::from_secs(2),
        }
    }
}

impl LockConfig {
    /// Set retry behaviour
    pub fn retry(mut self, times: u32, delay: Duration) -> Self {
        self.retry_times = times;
        self.retry_delay = delay;
        self
    }

    /// Set the lease length
    pub fn lease(mut self, lease: Duration) -> Self {
        self.lease_expire = lease;
        self
    }
}

/// Expiry of the hit/miss counters
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub global_expire: Duration,
    pub daily_expire: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            global_expire: Duration::from_secs(30 * 24 * 3600),
            daily_expire: Duration::from_secs(90 * 24 * 3600),
        }
    }
}

/// Everything [`TieredCache::new`](crate::TieredCache::new) needs
#[derive(Debug, Clone, Default)]
pub struct TieredCacheConfig {
    pub cache: CacheConfig,
    pub local: LocalCacheConfig,
    pub lock: LockConfig,
    pub stats: StatsConfig,
}

impl TieredCacheConfig {
    /// Aggregate with the given cache config and defaults elsewhere
    pub fn new(cache: CacheConfig) -> Self {
        Self {
            cache,
            ..Default::default()
        }
    }

    /// Set the local tier config
    pub fn local(mut self, local: LocalCacheConfig) -> Self {
        self.local = local;
        self
    }

    /// Set the lock config
    pub fn lock(mut self, lock: LockConfig) -> Self {
        self.lock = lock;
        self
    }

    /// Set the stats config
    pub fn stats(mut self, stats: StatsConfig) -> Self {
        self.stats = stats;
        self
    }
}

/// Per-handle write policy
///
/// Seeded from [`CacheConfig`] and adjusted through the `with_*` setters on
/// [`TieredCache`](crate::TieredCache). Each clone of the cache carries its
/// own policy.
#[derive(Debug, Clone)]
pub(crate) struct CachePolicy {
    pub tags: Vec<String>,
    pub enable_stats: bool,
    pub encrypt: bool,
    pub version: String,
    pub size_limit: usize,
    pub force_validate: bool,
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        Self {
            tags: Vec::new(),
            enable_stats: config.enable_stats,
            encrypt: config.encrypt_data,
            version: config.version.clone(),
            size_limit: config.size_limit,
            force_validate: config.force_validate,
        }
    }
}
