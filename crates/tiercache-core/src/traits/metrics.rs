//! Metrics trait for cache observability

use std::time::Duration;

/// Cache tier for metrics labeling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// L1 in-process cache
    Local,
    /// L2 shared remote store
    Remote,
}

impl CacheTier {
    /// Get tier as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Local => "l1_local",
            CacheTier::Remote => "l2_remote",
        }
    }
}

/// Cache operation for latency tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheOperation {
    Get,
    MGet,
    Set,
    MSet,
    Delete,
    Clear,
    Remember,
    Serialize,
    Deserialize,
}

impl CacheOperation {
    /// Get operation as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "get",
            CacheOperation::MGet => "mget",
            CacheOperation::Set => "set",
            CacheOperation::MSet => "mset",
            CacheOperation::Delete => "delete",
            CacheOperation::Clear => "clear",
            CacheOperation::Remember => "remember",
            CacheOperation::Serialize => "serialize",
            CacheOperation::Deserialize => "deserialize",
        }
    }
}

/// What happened when a lease was requested or given back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockOutcome {
    /// Lease obtained
    Acquired,
    /// Retry budget spent (or store unreachable); caller proceeds unprotected
    FailedOpen,
    /// Lease extended
    Renewed,
    /// Lease released by its holder
    Released,
    /// Renew or release found a different token (or none)
    RaceLost,
}

impl LockOutcome {
    /// Get outcome as string label
    pub fn as_str(&self) -> &'static str {
        match self {
            LockOutcome::Acquired => "acquired",
            LockOutcome::FailedOpen => "failed_open",
            LockOutcome::Renewed => "renewed",
            LockOutcome::Released => "released",
            LockOutcome::RaceLost => "race_lost",
        }
    }
}

/// Trait for cache metrics/observability
///
/// Implement this to integrate with your metrics system (Prometheus, StatsD, etc.)
pub trait CacheMetrics: Send + Sync + 'static {
    /// Record a cache hit
    fn record_hit(&self, key: &str, tier: CacheTier);

    /// Record a miss on both tiers
    fn record_miss(&self, key: &str);

    /// Record operation latency
    fn record_latency(&self, operation: CacheOperation, duration: Duration);

    /// Record a lock event
    fn record_lock(&self, key: &str, outcome: LockOutcome);

    /// Record an operation that fell back to a degraded result because the
    /// remote tier failed
    fn record_degraded(&self, operation: CacheOperation);

    /// Record a value refused for exceeding the size limit
    fn record_oversized(&self, key: &str, size: usize);

    /// Record an L1 entry evicted to make room
    fn record_eviction(&self, key: &str);
}

/// No-op metrics implementation (default)
///
/// Zero overhead when metrics are not needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    #[inline]
    fn record_hit(&self, _key: &str, _tier: CacheTier) {}

    #[inline]
    fn record_miss(&self, _key: &str) {}

    #[inline]
    fn record_latency(&self, _operation: CacheOperation, _duration: Duration) {}

    #[inline]
    fn record_lock(&self, _key: &str, _outcome: LockOutcome) {}

    #[inline]
    fn record_degraded(&self, _operation: CacheOperation) {}

    #[inline]
    fn record_oversized(&self, _key: &str, _size: usize) {}

    #[inline]
    fn record_eviction(&self, _key: &str) {}
}

/// Metrics adapter using the `metrics` crate
///
/// Integrates with Prometheus, StatsD, and other exporters via the `metrics` ecosystem.
///
/// # Example
/// ```ignore
/// use tiercache_core::MetricsCrateAdapter;
///
/// // Set up a metrics recorder (e.g., prometheus_exporter)
/// // metrics::set_global_recorder(recorder);
///
/// let metrics = MetricsCrateAdapter::new("tiercache");
/// // Emits: tiercache_hits_total, tiercache_lock_events_total, etc.
/// ```
#[cfg(feature = "metrics")]
#[derive(Debug, Clone)]
pub struct MetricsCrateAdapter {
    prefix: String,
}

#[cfg(feature = "metrics")]
impl MetricsCrateAdapter {
    /// Create a new adapter with the given metric name prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn metric_name(&self, name: &str) -> String {
        format!("{}_{}", self.prefix, name)
    }
}

#[cfg(feature = "metrics")]
impl CacheMetrics for MetricsCrateAdapter {
    fn record_hit(&self, _key: &str, tier: CacheTier) {
        metrics::counter!(self.metric_name("hits_total"), "tier" => tier.as_str()).increment(1);
    }

    fn record_miss(&self, _key: &str) {
        metrics::counter!(self.metric_name("misses_total")).increment(1);
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        metrics::histogram!(
            self.metric_name("operation_duration_seconds"),
            "operation" => operation.as_str()
        )
        .record(duration.as_secs_f64());
    }

    fn record_lock(&self, _key: &str, outcome: LockOutcome) {
        metrics::counter!(
            self.metric_name("lock_events_total"),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }

    fn record_degraded(&self, operation: CacheOperation) {
        metrics::counter!(
            self.metric_name("degraded_total"),
            "operation" => operation.as_str()
        )
        .increment(1);
    }

    fn record_oversized(&self, _key: &str, size: usize) {
        metrics::counter!(self.metric_name("oversized_total")).increment(1);
        metrics::histogram!(self.metric_name("oversized_bytes")).record(size as f64);
    }

    fn record_eviction(&self, _key: &str) {
        metrics::counter!(self.metric_name("evictions_total"), "tier" => CacheTier::Local.as_str())
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_as_str() {
        assert_eq!(CacheTier::Local.as_str(), "l1_local");
        assert_eq!(CacheTier::Remote.as_str(), "l2_remote");
    }

    #[test]
    fn test_labels_are_distinct() {
        let outcomes = [
            LockOutcome::Acquired,
            LockOutcome::FailedOpen,
            LockOutcome::Renewed,
            LockOutcome::Released,
            LockOutcome::RaceLost,
        ];
        let labels: std::collections::HashSet<_> = outcomes.iter().map(|o| o.as_str()).collect();
        assert_eq!(labels.len(), outcomes.len());
    }

    #[test]
    fn test_noop_metrics() {
        let metrics = NoopMetrics;
        metrics.record_hit("key", CacheTier::Local);
        metrics.record_miss("key");
        metrics.record_lock("key", LockOutcome::Acquired);
        metrics.record_degraded(CacheOperation::Set);
        metrics.record_latency(CacheOperation::Get, Duration::from_millis(1));
    }
}
