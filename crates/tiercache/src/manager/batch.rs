use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tiercache_core::{CacheMetrics, CacheOperation, CacheTier, RemoteStore, Serializer, StoreCommand};

use super::TieredCache;

/// One write of a [`TieredCache::mset`] batch
#[derive(Debug, Clone)]
pub struct SetItem<'a, T: ?Sized> {
    pub operation: &'a str,
    pub params: Value,
    pub value: &'a T,
    pub ttl: Option<Duration>,
}

impl<'a, T: ?Sized> SetItem<'a, T> {
    /// Write `value` for `(operation, params)` with the default TTL
    pub fn new(operation: &'a str, params: Value, value: &'a T) -> Self {
        Self {
            operation,
            params,
            value,
            ttl: None,
        }
    }

    /// Set TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

impl<R, S, M> TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Get several values at once
    ///
    /// Returns the hits keyed by their index in `items`. Local hits are
    /// served first; everything else is fetched with a single remote
    /// `MGET`. An entry that fails to decode is skipped on its own.
    pub async fn mget<T>(&self, items: &[(&str, Value)]) -> HashMap<usize, T>
    where
        T: DeserializeOwned,
    {
        let start = Instant::now();
        let mut found = HashMap::with_capacity(items.len());
        let mut pending = Vec::new();

        for (index, (operation, params)) in items.iter().enumerate() {
            let key = self.derive_key(operation, params);
            match self.local.get(&key).and_then(|bytes| self.decode(&key, &bytes)) {
                Some(value) => {
                    self.metrics.record_hit(&key, CacheTier::Local);
                    found.insert(index, value);
                }
                None => pending.push((index, key)),
            }
        }

        if pending.is_empty() {
            self.metrics
                .record_latency(CacheOperation::MGet, start.elapsed());
            return found;
        }

        let keys: Vec<String> = pending.iter().map(|(_, key)| key.clone()).collect();
        match self.store.mget(&keys).await {
            Ok(payloads) => {
                for ((index, key), payload) in pending.into_iter().zip(payloads) {
                    let Some(payload) = payload else {
                        self.metrics.record_miss(&key);
                        continue;
                    };
                    let bytes = self.open(payload);
                    match self.decode(&key, &bytes) {
                        Some(value) => {
                            self.backfill(&key, bytes, None);
                            self.metrics.record_hit(&key, CacheTier::Remote);
                            found.insert(index, value);
                        }
                        None => self.metrics.record_miss(&key),
                    }
                }
            }
            Err(e) => {
                tracing::warn!(target: "tiercache", keys = keys.len(), error = %e, "remote mget failed");
                self.metrics.record_degraded(CacheOperation::MGet);
            }
        }

        self.metrics
            .record_latency(CacheOperation::MGet, start.elapsed());
        found
    }

    /// Store several values with one remote pipeline
    ///
    /// The result has one flag per item, in order. Items refused for size
    /// or encoding stay `false`; every other item is `true`, even when the
    /// remote store is down and only the local tier got it.
    pub async fn mset<T>(&self, items: &[SetItem<'_, T>]) -> Vec<bool>
    where
        T: Serialize + ?Sized,
    {
        let start = Instant::now();
        let mut results = vec![false; items.len()];
        let mut commands = Vec::with_capacity(items.len());
        let mut accepted = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let key = self.derive_key(item.operation, &item.params);
            let ttl = item.ttl.unwrap_or(self.config.cache.default_expire);

            match self.seal(&key, item.value) {
                Ok((plain, payload)) => {
                    commands.push(StoreCommand::set_ex(&key, payload, ttl));
                    commands.extend(self.tag_commands(&key, ttl));
                    accepted.push((key, plain, ttl));
                    results[index] = true;
                }
                Err(e) => {
                    tracing::debug!(target: "tiercache", key = %key, error = %e, "batch item not cached");
                }
            }
        }

        if !commands.is_empty() {
            if let Err(e) = self.store.pipeline(&commands).await {
                tracing::warn!(target: "tiercache", items = accepted.len(), error = %e, "remote mset failed, keeping local copies only");
                self.metrics.record_degraded(CacheOperation::MSet);
            }
        }

        for (key, plain, ttl) in accepted {
            self.backfill(&key, plain, Some(self.local_ttl(ttl)));
        }

        self.metrics
            .record_latency(CacheOperation::MSet, start.elapsed());
        results
    }
}
