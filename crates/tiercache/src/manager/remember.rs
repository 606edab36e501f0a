use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};

use tiercache_core::{CacheMetrics, CacheOperation, RemoteStore, Serializer};

use super::TieredCache;
use super::stats::Counter;

impl<R, S, M> TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Get a value, computing and caching it on a miss
    ///
    /// On a miss the caller takes the lock on the entry's key, checks the
    /// cache again and only then runs `compute`, so concurrent callers of a
    /// cold key (in this process or any other) usually compute it once.
    /// When the lock can't be had within its retry budget the caller
    /// computes anyway.
    ///
    /// Errors from `compute` are returned as-is and nothing is cached.
    ///
    /// # Example
    /// ```ignore
    /// let user: User = cache
    ///     .remember("user_profile", &json!({"id": 7}), || async { db.load_user(7).await }, None)
    ///     .await?;
    /// ```
    pub async fn remember<T, E, F, Fut>(
        &self,
        operation: &str,
        params: &Value,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let key = self.derive_key(operation, params);

        if let Some(value) = self.lookup_key::<T>(&key).await.value() {
            self.record_stat(Counter::Hits).await;
            return Ok(value);
        }
        self.record_stat(Counter::Misses).await;

        let outcome = match self.lock.lock(&key).await {
            Some(lease) => {
                // Someone may have filled it while we waited for the lock
                if let Some(value) = self.lookup_key::<T>(&key).await.value() {
                    lease.release().await;
                    return Ok(value);
                }

                let outcome = compute().await;
                if let Ok(value) = &outcome {
                    self.set_key(&key, value, ttl).await;
                }
                lease.release().await;
                outcome
            }
            None => compute().await,
        };

        self.metrics
            .record_latency(CacheOperation::Remember, start.elapsed());
        outcome
    }

    /// Compute a value and cache it unconditionally
    pub async fn warm<T, E, F, Fut>(
        &self,
        operation: &str,
        params: &Value,
        compute: F,
        ttl: Option<Duration>,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = compute().await?;
        self.set(operation, params, &value, ttl).await;
        Ok(value)
    }
}
