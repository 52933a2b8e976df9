//! Concurrent weak-value map with a memory-bounded LRU pin set.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lru::LruCache;
use serde::Serialize;
use tracing::debug;

/// Values stored in a [`TileCache`] report their own memory footprint.
pub trait MemorySized {
    /// Approximate heap size of this value in bytes.
    fn size_bytes(&self) -> usize;
}

/// Statistics about a tile cache.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of live entries (upgradable weak handles).
    pub entries: usize,
    /// Bytes held alive by the pin set.
    pub memory_bytes: u64,
    /// Pins dropped to stay under the byte budget.
    pub evictions: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// The pin set evicts by memory, so the LRU entry limit only needs to be
// effectively unbounded.
const PIN_CAPACITY: usize = 1_000_000;

/// Thread-safe tile cache keyed by a linear tile index.
///
/// See the crate-level documentation for the sharing and race contract.
pub struct TileCache<V> {
    inner: Mutex<Inner<V>>,
    memory_limit: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct Inner<V> {
    entries: HashMap<u64, Weak<V>>,
    pinned: LruCache<u64, Arc<V>>,
    pinned_bytes: usize,
}

impl<V: MemorySized> TileCache<V> {
    /// Create a cache whose pin set holds at most `memory_limit` bytes.
    ///
    /// A limit of zero disables pinning entirely; entries then live only as
    /// long as external references do.
    pub fn new(memory_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                pinned: LruCache::new(NonZeroUsize::new(PIN_CAPACITY).unwrap()),
                pinned_bytes: 0,
            }),
            memory_limit,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a tile buffer.
    ///
    /// A dead entry (buffer dropped by all holders and unpinned) is pruned
    /// and counts as a miss; the caller is expected to decode and
    /// [`insert`](Self::insert). A hit refreshes the buffer's pin.
    pub fn get(&self, key: u64) -> Option<Arc<V>> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(&key).and_then(Weak::upgrade) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.pin_locked(&mut inner, key, value.clone());
                Some(value)
            }
            None => {
                inner.entries.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a freshly decoded buffer, returning the buffer now cached
    /// under `key`.
    ///
    /// When another thread won the decode race, the existing buffer is
    /// returned and `value` should be discarded by the caller.
    pub fn insert(&self, key: u64, value: Arc<V>) -> Arc<V> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.entries.get(&key).and_then(Weak::upgrade) {
            debug!(key, "discarding racing tile decode, keeping first insertion");
            self.pin_locked(&mut inner, key, existing.clone());
            return existing;
        }
        inner.entries.insert(key, Arc::downgrade(&value));
        self.pin_locked(&mut inner, key, value.clone());

        // Dead weak handles accumulate between inserts; sweep them once the
        // map is dominated by them.
        if inner.entries.len() > 2 * inner.pinned.len() + 64 {
            inner.entries.retain(|_, weak| weak.strong_count() > 0);
        }
        value
    }

    /// Check whether a live entry exists without touching LRU order or
    /// statistics.
    pub fn contains(&self, key: u64) -> bool {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&key)
            .is_some_and(|weak| weak.strong_count() > 0)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// True when no live entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently held alive by the pin set.
    pub fn pinned_bytes(&self) -> usize {
        self.inner.lock().unwrap().pinned_bytes
    }

    /// The pin set byte budget.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes) = {
            let inner = self.inner.lock().unwrap();
            (
                inner
                    .entries
                    .values()
                    .filter(|weak| weak.strong_count() > 0)
                    .count(),
                inner.pinned_bytes as u64,
            )
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
            memory_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Drop all entries and pins. Entries still referenced elsewhere stay
    /// alive for their holders but are no longer retrievable.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.pinned.clear();
        inner.pinned_bytes = 0;
    }

    /// Pin `value` under `key`, evicting least recently used pins until the
    /// byte budget is respected. A buffer larger than the whole budget is
    /// not pinned at all.
    fn pin_locked(&self, inner: &mut Inner<V>, key: u64, value: Arc<V>) {
        if inner.pinned.contains(&key) {
            inner.pinned.get(&key); // refresh LRU position
            return;
        }
        let size = value.size_bytes();
        while inner.pinned_bytes + size > self.memory_limit && !inner.pinned.is_empty() {
            if let Some((_, evicted)) = inner.pinned.pop_lru() {
                inner.pinned_bytes = inner.pinned_bytes.saturating_sub(evicted.size_bytes());
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        if size <= self.memory_limit {
            inner.pinned.put(key, value);
            inner.pinned_bytes += size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob(Vec<u8>);

    impl MemorySized for Blob {
        fn size_bytes(&self) -> usize {
            self.0.len()
        }
    }

    fn blob(len: usize) -> Arc<Blob> {
        Arc::new(Blob(vec![0; len]))
    }

    #[test]
    fn test_insert_and_get() {
        let cache = TileCache::new(1024);
        assert!(cache.get(7).is_none());

        let value = blob(16);
        cache.insert(7, value.clone());
        let hit = cache.get(7).expect("entry should be live");
        assert!(Arc::ptr_eq(&hit, &value));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_first_insertion_wins() {
        let cache = TileCache::new(1024);
        let first = blob(16);
        let second = blob(16);

        let winner = cache.insert(3, first.clone());
        assert!(Arc::ptr_eq(&winner, &first));

        // A racing loser gets the winner back and discards its own buffer.
        let winner = cache.insert(3, second.clone());
        assert!(Arc::ptr_eq(&winner, &first));
        assert!(!Arc::ptr_eq(&winner, &second));
    }

    #[test]
    fn test_weak_entry_dies_with_last_reference() {
        // Zero budget: the cache never pins, so it holds weak handles only.
        let cache = TileCache::new(0);
        let value = blob(16);
        cache.insert(1, value.clone());

        assert!(cache.get(1).is_some());
        drop(value);
        // The get above returned (and dropped) the only other Arc.
        assert!(cache.get(1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_bounded_eviction() {
        let cache = TileCache::new(100);
        for key in 0..10u64 {
            cache.insert(key, blob(40));
        }
        // At most two 40-byte pins fit in the 100-byte budget.
        assert!(cache.pinned_bytes() <= 100);
        assert!(cache.stats().evictions >= 8);
        // Most recently inserted entries survive via their pins.
        assert!(cache.get(9).is_some());
    }

    #[test]
    fn test_evicted_entry_survives_external_reference() {
        let cache = TileCache::new(50);
        let held = cache.insert(1, blob(40));
        cache.insert(2, blob(40)); // evicts the pin for key 1

        // Key 1 lost its pin but `held` keeps it alive.
        let again = cache.get(1).expect("externally referenced entry");
        assert!(Arc::ptr_eq(&again, &held));
    }

    #[test]
    fn test_oversized_value_not_pinned() {
        let cache = TileCache::new(10);
        let value = cache.insert(1, blob(100));
        assert_eq!(cache.pinned_bytes(), 0);
        assert!(cache.get(1).is_some());
        drop(value);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = TileCache::new(1024);
        cache.insert(1, blob(8));
        cache.insert(2, blob(8));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.pinned_bytes(), 0);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn test_hit_rate() {
        let cache = TileCache::new(1024);
        cache.insert(1, blob(8));
        cache.get(1);
        cache.get(2);
        let stats = cache.stats();
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
