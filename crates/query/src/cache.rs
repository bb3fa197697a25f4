//! Bounded LRU caches.
//!
//! Caches are plain values owned by whoever needs them: the query façade keeps
//! one for compiled query trees, each request context keeps one for the record
//! sets it has already pulled from the backend. Nothing here is global.

use alloc::collections::BTreeMap;
use core::hash::Hasher;

/// FNV-1a hasher used for query-text fingerprints.
struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    fn new() -> Self {
        Self {
            state: Self::FNV_OFFSET,
        }
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.state ^= *byte as u64;
            self.state = self.state.wrapping_mul(Self::FNV_PRIME);
        }
    }
}

/// Fingerprint of a query text. Runs of whitespace are treated as a single
/// space, so reformatting a statement does not defeat the cache.
pub fn fingerprint(text: &str) -> u64 {
    let mut hasher = FnvHasher::new();
    let mut in_space = false;
    for byte in text.trim().bytes() {
        if byte.is_ascii_whitespace() {
            if !in_space {
                hasher.write(b" ");
            }
            in_space = true;
        } else {
            hasher.write(&[byte]);
            in_space = false;
        }
    }
    hasher.finish()
}

struct CacheEntry<V> {
    value: V,
    last_access: u64,
}

/// Least-recently-used cache with a fixed capacity and hit/miss counters.
pub struct BoundedCache<K, V> {
    entries: BTreeMap<K, CacheEntry<V>>,
    max_size: usize,
    /// Monotonic access counter for LRU tracking.
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl<K: Ord + Clone, V> BoundedCache<K, V> {
    /// Creates a cache holding at most `max_size` entries. A size of zero
    /// disables caching.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_size,
            access_counter: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.access_counter += 1;
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = self.access_counter;
                self.hits += 1;
                Some(&entry.value)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.max_size == 0 {
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_lru();
        }
        self.access_counter += 1;
        self.entries.insert(
            key,
            CacheEntry {
                value,
                last_access: self.access_counter,
            },
        );
    }

    /// Returns a clone of the cached value or computes, caches and returns a
    /// new one. A failed computation caches nothing.
    pub fn get_or_try_insert_with<E, F>(&mut self, key: K, compute: F) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value.clone());
        }
        let value = compute()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Returns (hits, misses).
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Returns the hit rate in [0, 1]; 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    fn evict_lru(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;

    #[test]
    fn test_fingerprint_ignores_whitespace_runs() {
        assert_eq!(
            fingerprint("SELECT *  FROM\n authors"),
            fingerprint(" SELECT * FROM authors ")
        );
        assert_ne!(fingerprint("SELECT * FROM authors"), fingerprint("SELECT * FROM books"));
    }

    #[test]
    fn test_cache_hit_and_miss() {
        let mut cache: BoundedCache<u64, String> = BoundedCache::new(4);
        assert!(cache.get(&1).is_none());
        cache.insert(1, "one".into());
        assert_eq!(cache.get(&1).map(String::as_str), Some("one"));
        assert_eq!(cache.stats(), (1, 1));
        assert!((cache.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache: BoundedCache<u64, u64> = BoundedCache::new(2);
        cache.insert(1, 10);
        cache.insert(2, 20);
        // Touch 1 so that 2 becomes the eviction candidate.
        cache.get(&1);
        cache.insert(3, 30);

        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert!(cache.contains(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_get_or_try_insert_with() {
        let mut cache: BoundedCache<u64, u64> = BoundedCache::new(2);
        let v: Result<u64, ()> = cache.get_or_try_insert_with(7, || Ok(49));
        assert_eq!(v, Ok(49));
        let v: Result<u64, ()> = cache.get_or_try_insert_with(7, || Err(()));
        assert_eq!(v, Ok(49));
        let v: Result<u64, &str> = cache.get_or_try_insert_with(8, || Err("boom"));
        assert_eq!(v, Err("boom"));
        assert!(!cache.contains(&8));
        assert_eq!(cache.stats(), (1, 2));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing_on_insert() {
        let mut cache: BoundedCache<u64, u64> = BoundedCache::new(0);
        cache.insert(1, 1);
        assert!(cache.is_empty());
    }
}
