use std::fmt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use tiercache_core::{CacheMetrics, RemoteStore};

use super::DistributedLock;

/// A held lease
///
/// While alive (and `enable_extend` is set) a background task renews the
/// lease every `extend_interval`, stopping at the first failed renewal.
/// Call [`release`](Self::release) to give the lease back; dropping an
/// unreleased guard releases it from a spawned task.
pub struct LeaseGuard<R: RemoteStore, M: CacheMetrics> {
    lock: DistributedLock<R, M>,
    key: String,
    token: String,
    renewal: Option<JoinHandle<()>>,
    released: bool,
}

impl<R: RemoteStore, M: CacheMetrics> LeaseGuard<R, M> {
    pub(crate) fn new(lock: DistributedLock<R, M>, key: String, token: String) -> Self {
        let config = lock.config();
        let renewal = match Handle::try_current() {
            Ok(handle) if config.enable_extend && !config.extend_interval.is_zero() => {
                let lock = lock.clone();
                let key = key.clone();
                let token = token.clone();
                Some(handle.spawn(async move {
                    let interval = lock.config().extend_interval;
                    let lease = lock.config().lease_expire;
                    loop {
                        tokio::time::sleep(interval).await;
                        if !lock.renew(&key, &token, lease).await {
                            break;
                        }
                    }
                }))
            }
            _ => None,
        };

        Self {
            lock,
            key,
            token,
            renewal,
            released: false,
        }
    }

    /// The locked key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Ownership token of this lease
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Stop renewing and release the lease
    ///
    /// Returns `false` if the lease had already been lost.
    pub async fn release(mut self) -> bool {
        self.stop_renewal();
        self.released = true;
        self.lock.release(&self.key, &self.token).await
    }

    fn stop_renewal(&mut self) {
        if let Some(task) = self.renewal.take() {
            task.abort();
        }
    }
}

impl<R: RemoteStore, M: CacheMetrics> fmt::Debug for LeaseGuard<R, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaseGuard")
            .field("key", &self.key)
            .field("renewing", &self.renewal.is_some())
            .field("released", &self.released)
            .finish()
    }
}

impl<R: RemoteStore, M: CacheMetrics> Drop for LeaseGuard<R, M> {
    fn drop(&mut self) {
        self.stop_renewal();
        if self.released {
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let lock = self.lock.clone();
                let key = std::mem::take(&mut self.key);
                let token = std::mem::take(&mut self.token);
                handle.spawn(async move {
                    lock.release(&key, &token).await;
                });
            }
            Err(_) => {
                tracing::debug!(target: "tiercache", key = %self.key, "no runtime to release lease, letting it expire");
            }
        }
    }
}
