//! Hit/miss statistics read back from the remote store

use serde::Serialize;

/// Aggregate hit and miss counters
///
/// `today_*` counters cover the current UTC day.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HitStats {
    /// Hits since the global counters last expired
    pub hits: u64,
    /// Misses since the global counters last expired
    pub misses: u64,
    /// Hits recorded today
    pub today_hits: u64,
    /// Misses recorded today
    pub today_misses: u64,
    /// `hits / (hits + misses) * 100`, rounded to two decimals
    pub hit_rate: f64,
}

impl HitStats {
    /// Build stats from raw counters, computing the hit rate
    pub fn from_counts(hits: u64, misses: u64, today_hits: u64, today_misses: u64) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
        };

        Self {
            hits,
            misses,
            today_hits,
            today_misses,
            hit_rate,
        }
    }

    /// Total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }
}
