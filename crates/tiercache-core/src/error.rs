//! Error types for cache operations

use std::time::Duration;
use thiserror::Error;

/// Main error type for all cache operations
///
/// Errors are produced at the store and pool boundary. The tiered cache
/// itself converts every variant into a degraded result (miss, local-only
/// write, fail-open) instead of returning it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Remote store could not be reached
    #[error("connection error: {0}")]
    Connection(String),

    /// Remote store rejected or failed a command
    #[error("backend error: {0}")]
    Backend(String),

    /// No pooled connection became available in time
    #[error("connection pool exhausted after {0:?}")]
    PoolExhausted(Duration),

    /// Encoded payload is larger than the configured limit
    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    OversizedPayload { size: usize, limit: usize },

    /// Lock could not be acquired within the retry budget
    #[error("lock unavailable for key: {0}")]
    LockUnavailable(String),

    /// Lease token no longer matches the stored token
    #[error("lease lost for key: {0}")]
    LockRaceLost(String),

    /// Payload encryption or decryption failed
    #[error("encryption error: {0}")]
    Encryption(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
