//! Distributed lock over the remote store
//!
//! Leases are plain keys holding a random token. Ownership is decided by
//! the token alone: renew and release are compare-then-act operations run
//! atomically by the store, so a holder whose lease already expired can
//! never touch the lease of whoever took the key next.

mod guard;

pub use guard::LeaseGuard;

use rand::Rng;
use rand::distr::Alphanumeric;
use std::sync::Arc;
use std::time::Duration;

use tiercache_core::{CacheError, CacheMetrics, LockOutcome, NoopMetrics, RemoteStore};

use crate::config::LockConfig;

/// Upper bound of a single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Length of a lease token
const TOKEN_LEN: usize = 32;

fn new_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Sleep before the retry following `attempt` (0-based)
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

/// Token-based mutual exclusion on `{prefix}lock:{key}`
///
/// Acquisition is fail-open: when the retry budget runs out or the store
/// errors, callers get `None` and are expected to proceed unprotected.
pub struct DistributedLock<R: RemoteStore, M: CacheMetrics = NoopMetrics> {
    store: Arc<R>,
    prefix: String,
    config: LockConfig,
    metrics: Arc<M>,
}

impl<R: RemoteStore, M: CacheMetrics> Clone for DistributedLock<R, M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: self.prefix.clone(),
            config: self.config.clone(),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<R: RemoteStore> DistributedLock<R, NoopMetrics> {
    /// Create a lock without metrics
    pub fn new(store: Arc<R>, prefix: impl Into<String>, config: LockConfig) -> Self {
        Self::with_metrics(store, prefix, config, Arc::new(NoopMetrics))
    }
}

impl<R: RemoteStore, M: CacheMetrics> DistributedLock<R, M> {
    /// Create a lock reporting to `metrics`
    pub fn with_metrics(
        store: Arc<R>,
        prefix: impl Into<String>,
        config: LockConfig,
        metrics: Arc<M>,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            config,
            metrics,
        }
    }

    /// Lock configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Remote key guarding `key`
    pub fn lock_key(&self, key: &str) -> String {
        format!("{}lock:{}", self.prefix, key)
    }

    /// Acquire with the configured lease and retry budget
    pub async fn acquire(&self, key: &str) -> Option<String> {
        self.acquire_with(
            key,
            self.config.lease_expire,
            self.config.retry_times,
            self.config.retry_delay,
        )
        .await
    }

    /// Try to take the lease on `key`, returning its token
    ///
    /// Makes `retries` attempts in total, sleeping `base_delay * 2^n`
    /// (capped at one second) between them. Returns `None` once the budget
    /// is spent or on any store error.
    pub async fn acquire_with(
        &self,
        key: &str,
        lease: Duration,
        retries: u32,
        base_delay: Duration,
    ) -> Option<String> {
        let lock_key = self.lock_key(key);
        let token = new_token();
        let attempts = retries.max(1);

        for attempt in 0..attempts {
            match self.store.set_nx_ex(&lock_key, token.as_bytes(), lease).await {
                Ok(true) => {
                    self.metrics.record_lock(key, LockOutcome::Acquired);
                    return Some(token);
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(target: "tiercache", key = %lock_key, error = %e, "lock store error, failing open");
                    self.metrics.record_lock(key, LockOutcome::FailedOpen);
                    return None;
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(backoff(base_delay, attempt)).await;
            }
        }

        let err = CacheError::LockUnavailable(lock_key);
        tracing::debug!(target: "tiercache", attempts, "{err}, failing open");
        self.metrics.record_lock(key, LockOutcome::FailedOpen);
        None
    }

    /// Extend the lease, only if `token` still owns it
    pub async fn renew(&self, key: &str, token: &str, lease: Duration) -> bool {
        let lock_key = self.lock_key(key);
        match self.store.compare_and_expire(&lock_key, token, lease).await {
            Ok(true) => {
                self.metrics.record_lock(key, LockOutcome::Renewed);
                true
            }
            Ok(false) => {
                tracing::debug!(target: "tiercache", "{}", CacheError::LockRaceLost(lock_key));
                self.metrics.record_lock(key, LockOutcome::RaceLost);
                false
            }
            Err(e) => {
                tracing::warn!(target: "tiercache", key = %lock_key, error = %e, "lease renewal failed");
                false
            }
        }
    }

    /// Give the lease back, only if `token` still owns it
    pub async fn release(&self, key: &str, token: &str) -> bool {
        let lock_key = self.lock_key(key);
        match self.store.compare_and_delete(&lock_key, token).await {
            Ok(true) => {
                self.metrics.record_lock(key, LockOutcome::Released);
                true
            }
            Ok(false) => {
                tracing::debug!(target: "tiercache", "{}", CacheError::LockRaceLost(lock_key));
                self.metrics.record_lock(key, LockOutcome::RaceLost);
                false
            }
            Err(e) => {
                tracing::warn!(target: "tiercache", key = %lock_key, error = %e, "lease release failed");
                false
            }
        }
    }

    /// Acquire and wrap the lease in a guard
    ///
    /// With `enable_extend` the guard keeps renewing the lease until it is
    /// released or dropped.
    pub async fn lock(&self, key: &str) -> Option<LeaseGuard<R, M>> {
        let token = self.acquire(key).await?;
        Some(LeaseGuard::new(self.clone(), key.to_string(), token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_storage::MemoryStore;

    fn lock(store: &MemoryStore, config: LockConfig) -> DistributedLock<MemoryStore> {
        DistributedLock::new(Arc::new(store.clone()), "app:", config)
    }

    fn quick() -> LockConfig {
        LockConfig::default().retry(2, Duration::from_millis(5))
    }

    #[test]
    fn test_token_shape() {
        let token = new_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, new_token());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff(base, 0), Duration::from_millis(100));
        assert_eq!(backoff(base, 1), Duration::from_millis(200));
        assert_eq!(backoff(base, 2), Duration::from_millis(400));
        assert_eq!(backoff(base, 4), MAX_BACKOFF);
        assert_eq!(backoff(base, 40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive() {
        let store = MemoryStore::new();
        let lock = lock(&store, quick());

        let token = lock.acquire("k").await.unwrap();
        assert_eq!(store.get("app:lock:k").await.unwrap(), Some(token.clone().into_bytes()));
        assert!(lock.acquire("k").await.is_none());

        assert!(lock.release("k", &token).await);
        assert!(lock.acquire("k").await.is_some());
    }

    #[tokio::test]
    async fn test_acquire_after_lease_expires() {
        let store = MemoryStore::new();
        let lock = lock(&store, quick());

        lock.acquire_with("k", Duration::from_millis(20), 1, Duration::ZERO)
            .await
            .unwrap();
        let second = lock
            .acquire_with("k", Duration::from_secs(5), 5, Duration::from_millis(20))
            .await;
        assert!(second.is_some());
    }

    #[tokio::test]
    async fn test_stale_token_cannot_release_newer_lease() {
        let store = MemoryStore::new();
        let lock = lock(&store, quick());

        let stale = lock.acquire("k").await.unwrap();
        // Lease expired and someone else took it
        store
            .set_ex("app:lock:k", b"newer-holder", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!lock.release("k", &stale).await);
        assert!(!lock.renew("k", &stale, Duration::from_secs(30)).await);
        assert_eq!(
            store.get("app:lock:k").await.unwrap(),
            Some(b"newer-holder".to_vec())
        );
        assert!(store.ttl("app:lock:k").unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_renew_extends_lease() {
        let store = MemoryStore::new();
        let lock = lock(&store, quick());

        let token = lock
            .acquire_with("k", Duration::from_secs(1), 1, Duration::ZERO)
            .await
            .unwrap();
        assert!(lock.renew("k", &token, Duration::from_secs(60)).await);
        assert!(store.ttl("app:lock:k").unwrap() > Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_retry_budget_then_fail_open() {
        let store = MemoryStore::new();
        store
            .set_ex("app:lock:k", b"foreign", Duration::from_secs(5))
            .await
            .unwrap();
        let lock = lock(&store, LockConfig::default().retry(3, Duration::from_millis(10)));

        let started = std::time::Instant::now();
        assert!(lock.acquire("k").await.is_none());
        // 10ms + 20ms of backoff, no sleep after the last attempt
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(30));
        assert!(elapsed < Duration::from_millis(500));
    }
}
