use std::hash::Hash;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use super::entry::CacheEntry;
use super::lru::LruArena;
use super::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::error::ConfigError;

/// Fixed-capacity, thread-safe LRU cache with hit/miss telemetry.
///
/// The key index and the recency list sit behind one short-held mutex, so
/// every operation is atomic and operations on the same key linearize in
/// lock-acquisition order. Recency updates from concurrent `get`s on
/// different keys are serialized by the same lock. Counters live outside the
/// lock.
#[derive(Debug)]
pub struct BoundedConcurrentCache<K, V> {
    name: String,
    capacity: usize,
    arena: Mutex<LruArena<K, V>>,
    metrics: CacheMetrics,
}

impl<K, V> BoundedConcurrentCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self, ConfigError> {
        let name = name.into();
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity { name });
        }
        Ok(Self {
            name,
            capacity,
            arena: Mutex::new(LruArena::with_capacity(capacity)),
            metrics: CacheMetrics::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.arena.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a clone of the cached value, marking it most recently used.
    pub fn get(&self, key: &K) -> Option<V> {
        let started = Instant::now();
        let value = {
            let mut arena = self.arena.lock();
            arena.touch(key).map(|entry| {
                entry.record_access();
                entry.value.clone()
            })
        };
        let elapsed = started.elapsed();
        match value {
            Some(_) => self.metrics.record_hit(elapsed),
            None => self.metrics.record_miss(elapsed),
        }
        value
    }

    /// Reads a value without touching recency or metrics.
    pub fn peek(&self, key: &K) -> Option<V> {
        self.arena.lock().peek(key).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.arena.lock().contains(key)
    }

    /// Inserts or overwrites `key`.
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// used entry, which is returned. Overwriting never evicts.
    pub fn put(&self, key: K, value: V) -> Option<CacheEntry<K, V>> {
        let mut arena = self.arena.lock();
        if let Some(entry) = arena.touch(&key) {
            entry.overwrite(value);
            return None;
        }
        let evicted = if arena.len() >= self.capacity {
            arena.pop_back()
        } else {
            None
        };
        arena.push_front(CacheEntry::new(key, value));
        drop(arena);

        if evicted.is_some() {
            self.metrics.record_eviction();
            trace!(cache = %self.name, "evicted least recently used entry");
        }
        evicted
    }

    /// Removes `key` if present. Returns whether an entry was removed.
    pub fn invalidate(&self, key: &K) -> bool {
        self.arena.lock().remove(key).is_some()
    }

    /// Drops every entry and zeroes all counters.
    pub fn clear(&self) {
        let mut arena = self.arena.lock();
        arena.clear();
        self.metrics.reset();
    }

    /// Point-in-time copy of all entries, most recently used first.
    pub fn snapshot(&self) -> Vec<CacheEntry<K, V>> {
        self.arena.lock().iter().cloned().collect()
    }

    pub fn keys_by_recency(&self) -> Vec<K> {
        self.arena
            .lock()
            .iter()
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot(self.len(), self.capacity)
    }
}
