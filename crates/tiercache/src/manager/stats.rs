use chrono::Utc;

use tiercache_core::{CacheMetrics, HitStats, RemoteStore, Serializer, StoreCommand};

use super::TieredCache;
use super::invalidate::{SCAN_COUNT, SCAN_LIMIT};

/// Remote hit/miss counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Counter {
    Hits,
    Misses,
}

impl Counter {
    fn as_str(self) -> &'static str {
        match self {
            Counter::Hits => "hits",
            Counter::Misses => "misses",
        }
    }
}

/// Current UTC day as `YYYY-MM-DD`
fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

fn parse_counter(raw: Option<Vec<u8>>) -> u64 {
    raw.and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

impl<R, S, M> TieredCache<R, S, M>
where
    R: RemoteStore,
    S: Serializer,
    M: CacheMetrics,
{
    /// Read the hit/miss counters
    ///
    /// All zeros when the store can't be read.
    pub async fn get_stats(&self) -> HitStats {
        let day = today();
        let keys = [
            self.codec.stats_key(Counter::Hits.as_str(), None),
            self.codec.stats_key(Counter::Misses.as_str(), None),
            self.codec.stats_key(Counter::Hits.as_str(), Some(&day)),
            self.codec.stats_key(Counter::Misses.as_str(), Some(&day)),
        ];

        match self.store.mget(&keys).await {
            Ok(values) => {
                let mut counts = values.into_iter().map(parse_counter);
                let mut next = || counts.next().unwrap_or(0);
                HitStats::from_counts(next(), next(), next(), next())
            }
            Err(e) => {
                tracing::warn!(target: "tiercache", error = %e, "reading stats failed");
                HitStats::default()
            }
        }
    }

    /// Number of remote keys under the prefix (capped by the scan limit)
    pub async fn key_count(&self) -> usize {
        let pattern = self.codec.namespace_pattern(None);
        match self.store.scan(&pattern, SCAN_COUNT, SCAN_LIMIT).await {
            Ok(keys) => keys.len(),
            Err(e) => {
                tracing::warn!(target: "tiercache", error = %e, "counting keys failed");
                0
            }
        }
    }

    /// Check that the remote store answers
    pub async fn health_check(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(target: "tiercache", error = %e, "remote store health check failed");
                false
            }
        }
    }

    /// Bump the global and daily counter, when stats are enabled
    pub(crate) async fn record_stat(&self, counter: Counter) {
        if !self.policy.enable_stats {
            return;
        }

        let global = self.codec.stats_key(counter.as_str(), None);
        let daily = self.codec.stats_key(counter.as_str(), Some(&today()));
        let expiry = &self.config.stats;
        let commands = [
            StoreCommand::incr(global.clone()),
            StoreCommand::incr(daily.clone()),
            StoreCommand::expire(global, expiry.global_expire),
            StoreCommand::expire(daily, expiry.daily_expire),
        ];

        if let Err(e) = self.store.pipeline(&commands).await {
            tracing::debug!(target: "tiercache", counter = counter.as_str(), error = %e, "stats not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_counter() {
        assert_eq!(parse_counter(Some(b"42".to_vec())), 42);
        assert_eq!(parse_counter(Some(b"junk".to_vec())), 0);
        assert_eq!(parse_counter(None), 0);
    }

    #[test]
    fn test_today_format() {
        let day = today();
        assert_eq!(day.len(), 10);
        assert_eq!(&day[4..5], "-");
        assert_eq!(&day[7..8], "-");
    }
}
