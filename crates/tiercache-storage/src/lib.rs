//! tiercache-storage: local tier, connection pool and remote stores for tiercache

pub mod local;
pub mod pool;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

pub use local::{LocalCache, LocalCacheConfig};
pub use pool::{ConnectionPool, PoolConfig, PoolState, PoolStatus, PooledConnection};

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};
