//! tiercache: two-tier cache with stampede protection
//!
//! # Features
//!
//! - **Two tiers**: bounded in-process cache in front of Redis
//! - **Deterministic keys** from an operation name and its parameters
//! - **Stampede protection** through a token-based distributed lock
//! - **Graceful degradation**: a failing remote tier means misses and
//!   local-only writes, never errors
//! - **Tag and pattern invalidation**
//! - **Optional payload encryption** (AES-256-GCM)
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tiercache::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = TieredCache::new(MemoryStore::new(), TieredCacheConfig::default());
//!
//!     let params = json!({"id": 42, "page": 1});
//!     cache.set("user_profile", &params, &"Alice", None).await;
//!
//!     let name: Option<String> = cache.get("user_profile", &params).await;
//!     assert_eq!(name.as_deref(), Some("Alice"));
//!
//!     let total: std::result::Result<u64, std::convert::Infallible> = cache
//!         .remember("order_total", &json!({"user": 42}), || async { Ok(1250) }, None)
//!         .await;
//!     println!("{total:?}");
//! }
//! ```

mod config;
mod crypto;
mod key;
mod lock;
mod manager;

// Re-export core
pub use tiercache_core::*;

// Re-export storage
pub use tiercache_storage::{
    ConnectionPool, LocalCache, LocalCacheConfig, PoolConfig, PoolState, PoolStatus,
    PooledConnection,
};

#[cfg(feature = "memory")]
pub use tiercache_storage::MemoryStore;

#[cfg(feature = "redis")]
pub use tiercache_storage::{RedisConfig, RedisStore};

pub use config::{CacheConfig, LockConfig, StatsConfig, TieredCacheConfig};
pub use crypto::PayloadCipher;
pub use key::{DEFAULT_SECRET, KeyCodec, operation_id};
pub use lock::{DistributedLock, LeaseGuard};
pub use manager::{SetItem, TieredCache};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        CacheConfig, CacheError, CacheResult, CacheTier, HitStats, JsonSerializer, LocalCacheConfig,
        LockConfig, PoolConfig, Result, Serializer, SetItem, StatsConfig, TieredCache,
        TieredCacheConfig,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryStore;

    #[cfg(feature = "redis")]
    pub use crate::{RedisConfig, RedisStore};

    #[cfg(feature = "msgpack")]
    pub use crate::MsgPackSerializer;
}

#[cfg(test)]
mod tests;
