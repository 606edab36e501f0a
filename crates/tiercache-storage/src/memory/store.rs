//! In-process remote store using DashMap

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tiercache_core::{CacheError, RemoteStore, Result, StoreCommand};

use super::pattern::glob_match;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn bytes(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value: Value::Bytes(value),
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::Backend(format!(
        "WRONGTYPE operation against a key holding the wrong kind of value: {key}"
    ))
}

/// In-process implementation of [`RemoteStore`]
///
/// Mirrors the Redis semantics the tiered cache relies on (expiring
/// strings, sets, counters, token-guarded compare operations and glob
/// scans). Expired entries are dropped lazily on access.
///
/// Cloning creates a new handle to the SAME underlying store, so two
/// clones behave like two processes sharing one server.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Check if the store holds no live keys
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of `key`, if it exists and expires
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slot = self.data.get(key)?;
        if slot.is_expired(now) {
            return None;
        }
        slot.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Drop every key
    pub fn flush(&self) {
        self.data.clear();
    }

    /// Get the live slot for `key`, removing it if expired
    fn live(&self, key: &str) -> Option<Slot> {
        let now = Instant::now();
        let slot = self.data.get(key).map(|s| s.clone())?;
        if slot.is_expired(now) {
            self.data.remove_if(key, |_, s| s.is_expired(now));
            return None;
        }
        Some(slot)
    }

    fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Slot {
                value: Value::Bytes(bytes),
                ..
            }) => Ok(Some(bytes)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    fn write_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.data.insert(key.to_string(), Slot::bytes(value, Some(ttl)));
    }

    fn add_member(&self, key: &str, member: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entry = self.data.entry(key.to_string()).or_insert_with(|| Slot {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        if entry.is_expired(now) {
            *entry = Slot {
                value: Value::Set(HashSet::new()),
                expires_at: None,
            };
        }
        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::Bytes(_) => Err(wrong_type(key)),
        }
    }

    fn set_expiry(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        match self.data.get_mut(key) {
            Some(mut slot) if !slot.is_expired(now) => {
                // A deadline past what `Instant` can hold never expires
                slot.expires_at = now.checked_add(ttl);
                true
            }
            _ => false,
        }
    }

    fn increment(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(Slot::bytes(b"1".to_vec(), None));
                    return Ok(1);
                }
                let slot = entry.get_mut();
                let Value::Bytes(bytes) = &mut slot.value else {
                    return Err(wrong_type(key));
                };
                let current: i64 = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        CacheError::Backend(format!("value at {key} is not an integer"))
                    })?;
                let next = current + 1;
                *bytes = next.to_string().into_bytes();
                Ok(next)
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::bytes(b"1".to_vec(), None));
                Ok(1)
            }
        }
    }

    fn delete(&self, keys: &[String]) -> u64 {
        let now = Instant::now();
        keys.iter()
            .filter_map(|key| self.data.remove(key))
            .filter(|(_, slot)| !slot.is_expired(now))
            .count() as u64
    }

    fn holds_token(slot: &Slot, token: &str, now: Instant) -> bool {
        !slot.is_expired(now)
            && matches!(&slot.value, Value::Bytes(bytes) if bytes.as_slice() == token.as_bytes())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_bytes(key)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.write_ex(key, value.to_vec(), ttl);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(Slot::bytes(value.to_vec(), Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Slot::bytes(value.to_vec(), Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        // A non-string key reads as nil in MGET
        Ok(keys
            .iter()
            .map(|key| self.read_bytes(key).ok().flatten())
            .collect())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        Ok(self.delete(keys))
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        self.add_member(key, member)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        match self.live(key) {
            None => Ok(Vec::new()),
            Some(Slot {
                value: Value::Set(members),
                ..
            }) => Ok(members.into_iter().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        Ok(self.set_expiry(key, ttl))
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        self.increment(key)
    }

    async fn compare_and_expire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        match self.data.get_mut(key) {
            Some(mut slot) if Self::holds_token(&slot, token, now) => {
                slot.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn compare_and_delete(&self, key: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .data
            .remove_if(key, |_, slot| Self::holds_token(slot, token, now))
            .is_some())
    }

    async fn scan(&self, pattern: &str, _count: usize, limit: usize) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .data
            .iter()
            .filter(|e| !e.is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .take(limit)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn pipeline(&self, commands: &[StoreCommand]) -> Result<()> {
        for command in commands {
            match command {
                StoreCommand::SetEx { key, value, ttl } => {
                    self.write_ex(key, value.clone(), *ttl);
                }
                StoreCommand::SAdd { key, member } => {
                    self.add_member(key, member)?;
                }
                StoreCommand::Expire { key, ttl } => {
                    self.set_expiry(key, *ttl);
                }
                StoreCommand::Incr { key } => {
                    self.increment(key)?;
                }
                StoreCommand::Del { keys } => {
                    self.delete(keys);
                }
            }
        }
        Ok(())
    }
}
