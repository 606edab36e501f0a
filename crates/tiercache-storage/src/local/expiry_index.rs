//! Deadline-ordered index for the local tier

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Keys ordered by expiry deadline
///
/// Gives the local tier cheap access to both "everything already expired"
/// and "the entry closest to expiring" without scanning the whole map.
/// Ties on the deadline are broken by insertion order.
#[derive(Debug, Default)]
pub struct ExpiryIndex {
    /// (deadline, sequence) -> key
    by_deadline: BTreeMap<(Instant, u64), String>,
    /// key -> (deadline, sequence) for O(log n) removal
    by_key: HashMap<String, (Instant, u64)>,
    /// Monotonic tie-breaker
    seq: u64,
}

impl ExpiryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to expire at `deadline`, replacing any earlier schedule
    pub fn schedule(&mut self, key: String, deadline: Instant) {
        self.remove(&key);

        self.seq = self.seq.wrapping_add(1);
        let slot = (deadline, self.seq);
        self.by_deadline.insert(slot, key.clone());
        self.by_key.insert(key, slot);
    }

    /// Remove a key from the index
    pub fn remove(&mut self, key: &str) {
        if let Some(slot) = self.by_key.remove(key) {
            self.by_deadline.remove(&slot);
        }
    }

    /// Check if a key is scheduled
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Remove and return every key whose deadline is before `now`
    pub fn drain_expired(&mut self, now: Instant) -> Vec<String> {
        let mut expired = Vec::new();

        while let Some(entry) = self.by_deadline.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            self.by_key.remove(&key);
            expired.push(key);
        }

        expired
    }

    /// Remove and return the key with the nearest deadline
    pub fn pop_earliest(&mut self) -> Option<String> {
        let (_, key) = self.by_deadline.pop_first()?;
        self.by_key.remove(&key);
        Some(key)
    }

    /// Get the number of scheduled keys
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Clear all scheduled keys
    pub fn clear(&mut self) {
        self.by_deadline.clear();
        self.by_key.clear();
    }
}
