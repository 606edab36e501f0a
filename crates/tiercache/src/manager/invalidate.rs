use std::collections::HashSet;
use std::time::{Duration, Instant};

use tiercache_core::{CacheMetrics, CacheOperation, RemoteStore, Serializer};

use super::TieredCache;

/// SCAN page size hint
pub(crate) const SCAN_COUNT: usize = 1000;
/// Most keys collected by one clear
pub(crate) const SCAN_LIMIT: usize = 10_000;
/// Keys per DEL
const DELETE_BATCH: usize = 1000;
/// Pause between DEL batches
const BATCH_PAUSE: Duration = Duration::from_millis(10);

impl<R, S, M> TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Remove every remote entry of `operation`
    ///
    /// Covers the current version only unless `all_versions` is set. Local
    /// copies expire on their own.
    /// Returns `true` when nothing matched or something was deleted,
    /// `false` when matches survived or the store failed.
    pub async fn clear_by_operation(&self, operation: &str, all_versions: bool) -> bool {
        let version = (!all_versions).then_some(self.policy.version.as_str());
        let pattern = self.codec.operation_pattern(operation, version);
        self.clear_matching(&pattern).await
    }

    /// Remove every entry under the prefix
    ///
    /// With `all_versions` unset only the current version's entries go.
    /// Unlike the other clears this also flushes this process's local tier;
    /// other processes keep their copies until the local TTL passes.
    pub async fn clear_all(&self, all_versions: bool) -> bool {
        self.local.flush();
        let version = (!all_versions).then_some(self.policy.version.as_str());
        let pattern = self.codec.namespace_pattern(version);
        self.clear_matching(&pattern).await
    }

    /// Remove every remote entry written under any of `tags`, and the tag
    /// sets
    pub async fn clear_by_tags<I, T>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let start = Instant::now();
        let mut members = HashSet::new();
        let mut tag_keys = Vec::new();

        for tag in tags {
            let tag_key = self.codec.tag_key(tag.as_ref());
            match self.store.smembers(&tag_key).await {
                Ok(keys) => members.extend(keys),
                Err(e) => {
                    tracing::warn!(target: "tiercache", tag = %tag.as_ref(), error = %e, "reading tag members failed");
                    self.metrics.record_degraded(CacheOperation::Clear);
                    return false;
                }
            }
            tag_keys.push(tag_key);
        }

        if let Err(e) = self.store.del(&tag_keys).await {
            tracing::warn!(target: "tiercache", error = %e, "deleting tag sets failed");
            self.metrics.record_degraded(CacheOperation::Clear);
            return false;
        }
        if members.is_empty() {
            return true;
        }

        let keys: Vec<String> = members.into_iter().collect();

        let cleared = match self.store.del(&keys).await {
            Ok(deleted) => deleted > 0,
            Err(e) => {
                tracing::warn!(target: "tiercache", keys = keys.len(), error = %e, "deleting tagged entries failed");
                self.metrics.record_degraded(CacheOperation::Clear);
                false
            }
        };
        self.metrics
            .record_latency(CacheOperation::Clear, start.elapsed());
        cleared
    }

    async fn clear_matching(&self, pattern: &str) -> bool {
        let start = Instant::now();
        let mut keys = match self.store.scan(pattern, SCAN_COUNT, SCAN_LIMIT).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(target: "tiercache", pattern = %pattern, error = %e, "scan failed");
                self.metrics.record_degraded(CacheOperation::Clear);
                return false;
            }
        };
        // Wildcard versions also match lease keys; leases are never cleared
        let leases = self.lock.lock_key("");
        keys.retain(|key| !key.starts_with(&leases));
        if keys.is_empty() {
            return true;
        }

        let deleted = self.delete_in_batches(&keys).await;

        tracing::debug!(target: "tiercache", pattern = %pattern, matched = keys.len(), deleted, "cleared");
        self.metrics
            .record_latency(CacheOperation::Clear, start.elapsed());
        deleted > 0
    }

    /// Delete in chunks, pausing between them to spare the server
    async fn delete_in_batches(&self, keys: &[String]) -> u64 {
        let mut deleted = 0;
        let mut batches = keys.chunks(DELETE_BATCH).peekable();

        while let Some(batch) = batches.next() {
            match self.store.del(batch).await {
                Ok(count) => deleted += count,
                Err(e) => {
                    tracing::warn!(target: "tiercache", keys = batch.len(), error = %e, "batch delete failed");
                }
            }
            if batches.peek().is_some() {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
        }

        deleted
    }
}
