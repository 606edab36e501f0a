use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use redis::{Cmd, FromRedisValue, Pipeline, Script, ScriptInvocation};
use std::time::Duration;

use tiercache_core::{CacheError, RemoteStore, Result, StoreCommand};

use super::config::RedisConfig;
use crate::pool::{ConnectionPool, PooledConnection};

/// Extend the lease only while KEYS[1] still holds our token
const RENEW_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
"#;

/// Delete the lease only while KEYS[1] still holds our token
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Longest expiry sent to the server (100 years)
const MAX_EXPIRY_MS: u64 = 100 * 365 * 24 * 3600 * 1000;

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis())
        .unwrap_or(u64::MAX)
        .clamp(1, MAX_EXPIRY_MS)
}

fn backend_err(e: redis::RedisError) -> CacheError {
    if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Backend(e.to_string())
    }
}

/// Redis implementation of [`RemoteStore`]
///
/// Every call checks a multiplexed connection out of a [`ConnectionPool`],
/// runs one round trip and hands the connection back. Expiries use
/// millisecond precision. Token-guarded operations run as Lua scripts so
/// the compare and the write are atomic on the server.
#[derive(Clone)]
pub struct RedisStore {
    pool: ConnectionPool<RedisConnectionManager>,
    renew: Script,
    release: Script,
}

impl RedisStore {
    /// Connect and open the pool's minimum connections
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let manager = RedisConnectionManager::new(config.url.as_str())
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let pool = ConnectionPool::new(manager, config.pool).await?;

        Ok(Self {
            pool,
            renew: Script::new(RENEW_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &ConnectionPool<RedisConnectionManager> {
        &self.pool
    }

    /// Close all pooled connections
    pub fn close(&self) {
        self.pool.close_all();
    }

    async fn conn(&self) -> Result<PooledConnection<RedisConnectionManager>> {
        self.pool.acquire().await
    }

    async fn query<T: FromRedisValue>(&self, cmd: &Cmd) -> Result<T> {
        let mut conn = self.conn().await?;
        let result = cmd.query_async(&mut *conn).await;
        self.pool.release(conn).await;
        result.map_err(backend_err)
    }

    async fn query_pipeline(&self, pipe: &Pipeline) -> Result<()> {
        let mut conn = self.conn().await?;
        let result = pipe.query_async::<()>(&mut *conn).await;
        self.pool.release(conn).await;
        result.map_err(backend_err)
    }

    async fn invoke<T: FromRedisValue>(&self, invocation: &ScriptInvocation<'_>) -> Result<T> {
        let mut conn = self.conn().await?;
        let result = invocation.invoke_async(&mut *conn).await;
        self.pool.release(conn).await;
        result.map_err(backend_err)
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.query(redis::cmd("PSETEX").arg(key).arg(millis(ttl)).arg(value))
            .await
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let reply: Option<String> = self
            .query(
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(millis(ttl)),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.query(redis::cmd("MGET").arg(keys)).await
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.query(redis::cmd("DEL").arg(keys)).await
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let added: u64 = self.query(redis::cmd("SADD").arg(key).arg(member)).await?;
        Ok(added > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.query(redis::cmd("SMEMBERS").arg(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.query(redis::cmd("PEXPIRE").arg(key).arg(millis(ttl)))
            .await
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.query(redis::cmd("INCR").arg(key)).await
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let renewed: i64 = self
            .invoke(self.renew.key(key).arg(token).arg(millis(ttl)))
            .await?;
        Ok(renewed == 1)
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let deleted: i64 = self.invoke(self.release.key(key).arg(token)).await?;
        Ok(deleted == 1)
    }

    async fn scan(&self, pattern: &str, count: usize, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut found = Vec::new();
        let mut cursor = 0u64;

        let result = loop {
            let page: redis::RedisResult<(u64, Vec<String>)> = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut *conn)
                .await;

            match page {
                Ok((next, keys)) => {
                    let room = limit.saturating_sub(found.len());
                    found.extend(keys.into_iter().take(room));
                    cursor = next;
                    if cursor == 0 || found.len() >= limit {
                        break Ok(found);
                    }
                }
                Err(e) => break Err(backend_err(e)),
            }
        };

        self.pool.release(conn).await;
        result
    }

    async fn ping(&self) -> Result<()> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }

    async fn pipeline(&self, commands: &[StoreCommand]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for command in commands {
            match command {
                StoreCommand::SetEx { key, value, ttl } => {
                    pipe.cmd("PSETEX").arg(key).arg(millis(*ttl)).arg(value).ignore();
                }
                StoreCommand::SAdd { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                StoreCommand::Expire { key, ttl } => {
                    pipe.cmd("PEXPIRE").arg(key).arg(millis(*ttl)).ignore();
                }
                StoreCommand::Incr { key } => {
                    pipe.cmd("INCR").arg(key).ignore();
                }
                StoreCommand::Del { keys } if !keys.is_empty() => {
                    pipe.cmd("DEL").arg(keys).ignore();
                }
                StoreCommand::Del { .. } => {}
            }
        }

        self.query_pipeline(&pipe).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_never_zero() {
        assert_eq!(millis(Duration::from_secs(2)), 2000);
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::MAX), MAX_EXPIRY_MS);
    }

    // Needs a local Redis: cargo test --features redis -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_roundtrip_against_server() {
        let store = RedisStore::new(RedisConfig::default()).await.unwrap();
        let ttl = Duration::from_secs(10);

        store.set_ex("tiercache:test:k", b"v", ttl).await.unwrap();
        assert_eq!(
            store.get("tiercache:test:k").await.unwrap(),
            Some(b"v".to_vec())
        );

        assert!(store.set_nx_ex("tiercache:test:lock", b"t1", ttl).await.unwrap());
        assert!(!store.compare_and_delete("tiercache:test:lock", "t2").await.unwrap());
        assert!(store.compare_and_delete("tiercache:test:lock", "t1").await.unwrap());

        let keys = store.scan("tiercache:test:*", 100, 10).await.unwrap();
        assert!(keys.contains(&"tiercache:test:k".to_string()));
        store.del(&keys).await.unwrap();
        store.close();
    }
}
