//! Cache result type

use crate::CacheTier;

/// Result of a tiered cache lookup
///
/// Lookups never return an error: a remote failure is reported as
/// [`CacheResult::Unavailable`] so callers can tell a degraded miss from a
/// real one without catching anything.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheResult<T> {
    /// Value found in the given tier
    Hit { value: T, tier: CacheTier },
    /// Neither tier holds the key
    Miss,
    /// Local tier missed and the remote tier could not be read
    Unavailable,
}

impl<T> CacheResult<T> {
    /// Check if this is a hit
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheResult::Hit { .. })
    }

    /// Check if this is a miss (degraded or not)
    pub fn is_miss(&self) -> bool {
        !self.is_hit()
    }

    /// Check if the remote tier failed during the lookup
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CacheResult::Unavailable)
    }

    /// Tier that served the hit
    pub fn tier(&self) -> Option<CacheTier> {
        match self {
            CacheResult::Hit { tier, .. } => Some(*tier),
            _ => None,
        }
    }

    /// Extract the value, consuming the result
    pub fn value(self) -> Option<T> {
        match self {
            CacheResult::Hit { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Map the value if present
    pub fn map<U, F>(self, f: F) -> CacheResult<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            CacheResult::Hit { value, tier } => CacheResult::Hit {
                value: f(value),
                tier,
            },
            CacheResult::Miss => CacheResult::Miss,
            CacheResult::Unavailable => CacheResult::Unavailable,
        }
    }
}

impl<T> From<CacheResult<T>> for Option<T> {
    fn from(result: CacheResult<T>) -> Self {
        result.value()
    }
}
