use crate::{CacheMetrics, CacheOperation, CacheTier, LockOutcome};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Metrics adapter that reports cache events through `tracing`
///
/// Hits, misses and lock events are `debug`, latencies and evictions
/// `trace`, and anything degraded or refused is `warn`.
#[derive(Debug, Clone, Default)]
pub struct TracingMetrics {
    service: Option<String>,
}

impl TracingMetrics {
    /// Create new tracing metrics adapter
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a service name to every event
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }

    fn service(&self) -> &str {
        self.service.as_deref().unwrap_or("-")
    }
}

impl CacheMetrics for TracingMetrics {
    fn record_hit(&self, key: &str, tier: CacheTier) {
        debug!(target: "tiercache", service = self.service(), key, tier = tier.as_str(), "hit");
    }

    fn record_miss(&self, key: &str) {
        debug!(target: "tiercache", service = self.service(), key, "miss");
    }

    fn record_latency(&self, operation: CacheOperation, duration: Duration) {
        trace!(
            target: "tiercache",
            service = self.service(),
            operation = operation.as_str(),
            micros = duration.as_micros() as u64,
            "latency"
        );
    }

    fn record_lock(&self, key: &str, outcome: LockOutcome) {
        debug!(target: "tiercache", service = self.service(), key, outcome = outcome.as_str(), "lock");
    }

    fn record_degraded(&self, operation: CacheOperation) {
        warn!(
            target: "tiercache",
            service = self.service(),
            operation = operation.as_str(),
            "remote tier unavailable, result degraded"
        );
    }

    fn record_oversized(&self, key: &str, size: usize) {
        warn!(target: "tiercache", service = self.service(), key, size, "value over size limit, not cached");
    }

    fn record_eviction(&self, key: &str) {
        trace!(target: "tiercache", service = self.service(), key, "local entry evicted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name() {
        assert_eq!(TracingMetrics::new().service(), "-");
        assert_eq!(TracingMetrics::new().with_service_name("billing").service(), "billing");
    }

    #[test]
    fn test_events_without_subscriber() {
        let metrics = TracingMetrics::new();
        metrics.record_hit("k", CacheTier::Remote);
        metrics.record_lock("k", LockOutcome::FailedOpen);
        metrics.record_oversized("k", 2048);
    }
}
