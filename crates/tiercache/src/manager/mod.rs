//! Tiered cache orchestrator

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tiercache_core::{
    CacheError, CacheMetrics, CacheOperation, CacheResult, CacheTier, JsonSerializer, NoopMetrics,
    RemoteStore, Result, Sanitizer, Serializer, StoreCommand,
};
use tiercache_storage::LocalCache;

use crate::config::{CachePolicy, TieredCacheConfig};
use crate::crypto::PayloadCipher;
use crate::key::KeyCodec;
use crate::lock::DistributedLock;

mod batch;
mod invalidate;
mod remember;
mod stats;

pub use batch::SetItem;

/// How much longer a tag set lives than the entries it indexes
const TAG_GRACE: Duration = Duration::from_secs(3600);

/// Two-tier cache keyed by `(operation, params)`
///
/// Reads try the in-process tier first, then the remote store. Writes go to
/// both. Every remote failure degrades instead of erroring: reads become
/// misses, writes land in the local tier only.
///
/// Generic over:
/// - `R`: The remote store (Redis, in-process)
/// - `S`: The serializer (JSON, MessagePack)
/// - `M`: The metrics collector
///
/// Clones share both tiers, the lock and the metrics, but each carries its
/// own write policy (tags, version, encryption and so on), so
/// `cache.clone().with_tags(["users"])` scopes tags to one call site.
pub struct TieredCache<R, S = JsonSerializer, M = NoopMetrics>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    store: Arc<R>,
    local: LocalCache,
    codec: KeyCodec,
    cipher: PayloadCipher,
    lock: DistributedLock<R, M>,
    serializer: S,
    metrics: Arc<M>,
    config: Arc<TieredCacheConfig>,
    policy: CachePolicy,
}

impl<R: RemoteStore> TieredCache<R, JsonSerializer, NoopMetrics> {
    /// Create a cache with the JSON serializer and no metrics
    pub fn new(store: R, config: TieredCacheConfig) -> Self {
        Self::with_serializer_and_metrics(store, JsonSerializer, NoopMetrics, config)
    }
}

impl<R, S, M> TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Create a cache with a custom serializer and metrics
    pub fn with_serializer_and_metrics(
        store: R,
        serializer: S,
        metrics: M,
        config: TieredCacheConfig,
    ) -> Self {
        let store = Arc::new(store);
        let metrics = Arc::new(metrics);
        let secret = config.cache.app_key.as_deref();

        Self {
            codec: KeyCodec::new(config.cache.prefix.clone(), secret),
            cipher: PayloadCipher::new(secret),
            local: LocalCache::new(config.local.clone()),
            lock: DistributedLock::with_metrics(
                Arc::clone(&store),
                config.cache.prefix.clone(),
                config.lock.clone(),
                Arc::clone(&metrics),
            ),
            policy: CachePolicy::from(&config.cache),
            store,
            serializer,
            metrics,
            config: Arc::new(config),
        }
    }

    /// Replace the sanitizer applied to parameter values
    pub fn with_sanitizer(mut self, sanitizer: impl Sanitizer) -> Self {
        self.codec = KeyCodec::with_sanitizer(
            self.config.cache.prefix.clone(),
            self.config.cache.app_key.as_deref(),
            sanitizer,
        );
        self
    }

    /// Tag every entry written through this handle
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.policy.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Toggle hit/miss counters for `remember`
    pub fn with_stats_enabled(mut self, enabled: bool) -> Self {
        self.policy.enable_stats = enabled;
        self
    }

    /// Toggle remote payload encryption
    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.policy.encrypt = enabled;
        self
    }

    /// Use another key version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.policy.version = version.into();
        self
    }

    /// Set the largest accepted payload, in bytes
    pub fn with_size_limit(mut self, limit: usize) -> Self {
        self.policy.size_limit = limit;
        self
    }

    /// Toggle parameter sanitizing during key derivation
    pub fn with_force_validate(mut self, enabled: bool) -> Self {
        self.policy.force_validate = enabled;
        self
    }

    /// The in-process tier
    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    /// The remote store
    pub fn store(&self) -> &R {
        &self.store
    }

    /// The distributed lock
    pub fn lock(&self) -> &DistributedLock<R, M> {
        &self.lock
    }

    /// Configuration the cache was built with
    pub fn config(&self) -> &TieredCacheConfig {
        &self.config
    }

    /// Key version used by this handle
    pub fn version(&self) -> &str {
        &self.policy.version
    }

    /// Cache key for an operation call under this handle's policy
    pub fn derive_key(&self, operation: &str, params: &Value) -> String {
        self.codec.derive_key(
            operation,
            params,
            &self.policy.version,
            self.policy.force_validate,
        )
    }

    /// Look a value up, reporting which tier served it
    pub async fn lookup<T>(&self, operation: &str, params: &Value) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let key = self.derive_key(operation, params);
        let result = self.lookup_key(&key).await;
        self.metrics
            .record_latency(CacheOperation::Get, start.elapsed());
        result
    }

    /// Get a value, `None` on a miss or when the remote tier is down
    pub async fn get<T>(&self, operation: &str, params: &Value) -> Option<T>
    where
        T: DeserializeOwned,
    {
        self.lookup(operation, params).await.into()
    }

    /// Store a value in both tiers
    ///
    /// `ttl = None` uses the configured default. Returns `false` only when
    /// the value can't be encoded or exceeds the size limit; if the remote
    /// store is unreachable the value is kept locally and this still
    /// returns `true`.
    pub async fn set<T>(
        &self,
        operation: &str,
        params: &Value,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool
    where
        T: Serialize + ?Sized,
    {
        let key = self.derive_key(operation, params);
        self.set_key(&key, value, ttl).await
    }

    /// Delete a value from the remote tier
    ///
    /// Returns `true` if the remote store removed it. Local copies, in this
    /// process or any other, are left to expire with the local TTL.
    pub async fn delete(&self, operation: &str, params: &Value) -> bool {
        let start = Instant::now();
        let key = self.derive_key(operation, params);

        let deleted = match self.store.del(std::slice::from_ref(&key)).await {
            Ok(count) => count > 0,
            Err(e) => {
                tracing::warn!(target: "tiercache", key = %key, error = %e, "remote delete failed");
                self.metrics.record_degraded(CacheOperation::Delete);
                false
            }
        };

        self.metrics
            .record_latency(CacheOperation::Delete, start.elapsed());
        deleted
    }

    pub(crate) async fn lookup_key<T>(&self, key: &str) -> CacheResult<T>
    where
        T: DeserializeOwned,
    {
        if let Some(value) = self.local.get(key).and_then(|bytes| self.decode(key, &bytes)) {
            self.metrics.record_hit(key, CacheTier::Local);
            return CacheResult::Hit {
                value,
                tier: CacheTier::Local,
            };
        }

        match self.store.get(key).await {
            Ok(Some(payload)) => {
                let bytes = self.open(payload);
                match self.decode(key, &bytes) {
                    Some(value) => {
                        self.backfill(key, bytes, None);
                        self.metrics.record_hit(key, CacheTier::Remote);
                        CacheResult::Hit {
                            value,
                            tier: CacheTier::Remote,
                        }
                    }
                    None => {
                        self.metrics.record_miss(key);
                        CacheResult::Miss
                    }
                }
            }
            Ok(None) => {
                self.metrics.record_miss(key);
                CacheResult::Miss
            }
            Err(e) => {
                tracing::warn!(target: "tiercache", key = %key, error = %e, "remote read failed, treating as miss");
                self.metrics.record_degraded(CacheOperation::Get);
                CacheResult::Unavailable
            }
        }
    }

    pub(crate) async fn set_key<T>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool
    where
        T: Serialize + ?Sized,
    {
        let start = Instant::now();
        let ttl = ttl.unwrap_or(self.config.cache.default_expire);

        let (plain, payload) = match self.seal(key, value) {
            Ok(sealed) => sealed,
            Err(e) => {
                tracing::debug!(target: "tiercache", key = %key, error = %e, "value not cached");
                return false;
            }
        };

        let mut commands = vec![StoreCommand::set_ex(key, payload, ttl)];
        commands.extend(self.tag_commands(key, ttl));
        if let Err(e) = self.store.pipeline(&commands).await {
            tracing::warn!(target: "tiercache", key = %key, error = %e, "remote write failed, keeping local copy only");
            self.metrics.record_degraded(CacheOperation::Set);
        }

        self.backfill(key, plain, Some(self.local_ttl(ttl)));
        self.metrics
            .record_latency(CacheOperation::Set, start.elapsed());
        true
    }

    /// Encode a value, returning `(local bytes, remote payload)`
    fn seal<T>(&self, key: &str, value: &T) -> Result<(Vec<u8>, Vec<u8>)>
    where
        T: Serialize + ?Sized,
    {
        let serialize_start = Instant::now();
        let plain = self.serializer.serialize(value)?;
        self.metrics
            .record_latency(CacheOperation::Serialize, serialize_start.elapsed());
        self.check_size(key, plain.len())?;

        if !self.policy.encrypt {
            return Ok((plain.clone(), plain));
        }
        let payload = self.cipher.encrypt(&plain)?;
        self.check_size(key, payload.len())?;
        Ok((plain, payload))
    }

    fn check_size(&self, key: &str, size: usize) -> Result<()> {
        let limit = self.policy.size_limit;
        if size > limit {
            self.metrics.record_oversized(key, size);
            return Err(CacheError::OversizedPayload { size, limit });
        }
        Ok(())
    }

    /// Decrypt a remote payload when this handle encrypts
    fn open(&self, payload: Vec<u8>) -> Vec<u8> {
        if self.policy.encrypt {
            self.cipher.decrypt_or_raw(payload)
        } else {
            payload
        }
    }

    fn decode<T>(&self, key: &str, bytes: &[u8]) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let decoded = self.serializer.deserialize(bytes);
        self.metrics
            .record_latency(CacheOperation::Deserialize, start.elapsed());

        match decoded {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(target: "tiercache", key = %key, error = %e, "undecodable entry, treating as miss");
                None
            }
        }
    }

    fn backfill(&self, key: &str, bytes: Vec<u8>, ttl: Option<Duration>) {
        if let Some(evicted) = self.local.set(key, bytes, ttl) {
            self.metrics.record_eviction(&evicted);
        }
    }

    /// Local copies never outlive the local tier's own TTL
    fn local_ttl(&self, ttl: Duration) -> Duration {
        ttl.min(self.local.default_ttl())
    }

    fn tag_commands(&self, key: &str, ttl: Duration) -> Vec<StoreCommand> {
        self.policy
            .tags
            .iter()
            .flat_map(|tag| {
                let tag_key = self.codec.tag_key(tag);
                [
                    StoreCommand::sadd(tag_key.clone(), key),
                    StoreCommand::expire(tag_key, ttl.saturating_add(TAG_GRACE)),
                ]
            })
            .collect()
    }
}

impl<R, S, M> Clone for TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            local: self.local.clone(),
            codec: self.codec.clone(),
            cipher: self.cipher.clone(),
            lock: self.lock.clone(),
            serializer: self.serializer.clone(),
            metrics: Arc::clone(&self.metrics),
            config: Arc::clone(&self.config),
            policy: self.policy.clone(),
        }
    }
}
