//! Bounded decode cache for full iteration
//!
//! Maps a raw data-section pointer to the object decoded from it. Many
//! networks in a database point at the same record, so a hit hands out the
//! same `Arc` instead of decoding again. Each iteration owns one cache; it
//! is never shared between threads.

use crate::error::Result;
use lru::LruCache;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Most-recently-used map from data pointer to decoded value
pub struct CachedDictionary<T> {
    entries: LruCache<u32, Arc<T>, BuildHasherDefault<FxHasher>>,
    hits: u64,
    misses: u64,
}

impl<T> CachedDictionary<T> {
    /// Cache holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or_else(|| {
            log::warn!("decode cache size 0 is not usable, using 1");
            NonZeroUsize::MIN
        });
        Self {
            entries: LruCache::with_hasher(cap, BuildHasherDefault::default()),
            hits: 0,
            misses: 0,
        }
    }

    /// Cached value for `pointer`, decoding and inserting it on a miss.
    ///
    /// A hit promotes the entry to most recently used. A failed decode
    /// leaves the cache untouched.
    pub fn get_or_decode<F>(&mut self, pointer: u32, decode: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.entries.get(&pointer) {
            self.hits += 1;
            return Ok(Arc::clone(value));
        }
        self.misses += 1;
        let value = Arc::new(decode()?);
        self.entries.put(pointer, Arc::clone(&value));
        Ok(value)
    }

    /// Cached value without touching the recency order
    pub fn peek(&self, pointer: u32) -> Option<&Arc<T>> {
        self.entries.peek(&pointer)
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// (hits, misses) since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_hit_returns_same_instance() {
        let mut cache = CachedDictionary::new(4);
        let first = cache.get_or_decode(10, || Ok(String::from("a"))).unwrap();
        let second = cache
            .get_or_decode(10, || panic!("must not decode twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut cache = CachedDictionary::new(2);
        cache.get_or_decode(1, || Ok(1u32)).unwrap();
        cache.get_or_decode(2, || Ok(2u32)).unwrap();
        // touch 1 so that 2 becomes the eviction candidate
        cache.get_or_decode(1, || Ok(0u32)).unwrap();
        cache.get_or_decode(3, || Ok(3u32)).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.peek(1).is_some());
        assert!(cache.peek(2).is_none());
        assert!(cache.peek(3).is_some());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut cache = CachedDictionary::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.get_or_decode(1, || Ok(1u8)).unwrap();
        cache.get_or_decode(2, || Ok(2u8)).unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_decode_not_cached() {
        let mut cache: CachedDictionary<u8> = CachedDictionary::new(2);
        let err = cache
            .get_or_decode(7, || Err(Error::invalid("bad record")))
            .unwrap_err();
        assert!(err.is_invalid_database());
        assert!(cache.is_empty());
        assert_eq!(*cache.get_or_decode(7, || Ok(9)).unwrap(), 9);
    }
}
