//! Small bounded cache whose entries expire a fixed time after last access.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};
use tracing::trace;

/// Set of keys that are forgotten `ttl` after they were last touched.
///
/// Expired entries are evicted lazily, on the next access. When full, the
/// least recently accessed key makes room for a new one.
#[derive(Debug)]
pub struct TtlCache<K> {
    entries: HashMap<K, Instant>,
    ttl: Duration,
    max_entries: usize,
}

impl<K: Eq + Hash + Clone> TtlCache<K> {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::with_capacity(max_entries),
            ttl,
            max_entries,
        }
    }

    pub fn insert(&mut self, key: K) {
        self.insert_at(key, Instant::now());
    }

    pub fn insert_at(&mut self, key: K, now: Instant) {
        if self.max_entries == 0 {
            return;
        }
        self.evict_expired(now);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(key, now);
    }

    /// Whether `key` was touched within the TTL. A hit counts as an access.
    pub fn contains(&mut self, key: &K) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn contains_at(&mut self, key: &K, now: Instant) -> bool {
        self.evict_expired(now);
        match self.entries.get_mut(key) {
            Some(last_access) => {
                *last_access = now;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, last_access| now.saturating_duration_since(*last_access) < ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            trace!("Evicted {} expired cache entries", removed);
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, last_access)| **last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
