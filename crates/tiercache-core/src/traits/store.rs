//! Remote store trait

use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

/// A write command that can be batched into a single round trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    /// Store `value` under `key`, expiring after `ttl`
    SetEx {
        key: String,
        value: Vec<u8>,
        ttl: Duration,
    },
    /// Add `member` to the set stored at `key`
    SAdd { key: String, member: String },
    /// Set the time-to-live of `key`
    Expire { key: String, ttl: Duration },
    /// Increment the integer counter at `key`
    Incr { key: String },
    /// Delete the given keys
    Del { keys: Vec<String> },
}

impl StoreCommand {
    /// Shorthand for [`StoreCommand::SetEx`]
    pub fn set_ex(key: impl Into<String>, value: Vec<u8>, ttl: Duration) -> Self {
        StoreCommand::SetEx {
            key: key.into(),
            value,
            ttl,
        }
    }

    /// Shorthand for [`StoreCommand::SAdd`]
    pub fn sadd(key: impl Into<String>, member: impl Into<String>) -> Self {
        StoreCommand::SAdd {
            key: key.into(),
            member: member.into(),
        }
    }

    /// Shorthand for [`StoreCommand::Expire`]
    pub fn expire(key: impl Into<String>, ttl: Duration) -> Self {
        StoreCommand::Expire {
            key: key.into(),
            ttl,
        }
    }

    /// Shorthand for [`StoreCommand::Incr`]
    pub fn incr(key: impl Into<String>) -> Self {
        StoreCommand::Incr { key: key.into() }
    }
}

/// The shared remote tier (L2)
///
/// Every remote operation the tiered cache and the distributed lock need is
/// listed here explicitly. Keys are passed fully qualified: implementations
/// must not add their own prefix. Quirks of a particular client stay behind
/// the implementation.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Get the raw payload stored at `key`
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` at `key` with an expiry
    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Store `value` at `key` with an expiry, only if `key` is absent
    ///
    /// Returns `true` if the value was written.
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Get multiple keys at once
    ///
    /// Returns a vector of results in the same order as the input keys.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Add a member to a set, returning `true` if it was not already present
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set (empty if the set doesn't exist)
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// Set the expiry of an existing key
    ///
    /// Returns `false` if the key doesn't exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Increment an integer counter, creating it at zero first
    async fn incr(&self, key: &str) -> Result<i64>;

    /// Atomically extend the expiry of `key` if it still holds `token`
    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Atomically delete `key` if it still holds `token`
    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool>;

    /// Collect keys matching a glob `pattern`
    ///
    /// `count` is the per-iteration hint; collection stops before the
    /// result would grow past `limit` keys.
    async fn scan(&self, pattern: &str, count: usize, limit: usize) -> Result<Vec<String>>;

    /// Lightweight round trip used as a liveness check
    async fn ping(&self) -> Result<()>;

    /// Run a batch of write commands in one round trip
    async fn pipeline(&self, commands: &[StoreCommand]) -> Result<()>;
}
