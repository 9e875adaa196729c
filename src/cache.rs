//! Optional read-through cache of untransformed blocks
//!
//! The cache is strictly best-effort: `try_read` may miss at any time and
//! `store` may refuse. The random-access writer invalidates an entry on
//! every mutation; readers populate on every fill miss. Correctness never
//! depends on the cache; it only skips the seek + read + untransform work
//! for hot blocks.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Side cache keyed by block index, holding whole untransformed blocks.
pub trait BlockCache: Send + Sync {
    /// Copy the cached block into `out` if present. Returns `false` on miss.
    fn try_read(&self, index: u64, out: &mut [u8]) -> bool;

    /// Offer a block to the cache. The cache may decline.
    fn store(&self, index: u64, block: &[u8]);

    /// Drop any cached copy of the block.
    fn invalidate(&self, index: u64);
}

/// Cache hit counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

struct LruInner {
    blocks: HashMap<u64, Vec<u8>>,
    /// Front = most recently used.
    order: VecDeque<u64>,
    hits: u64,
    misses: u64,
}

impl LruInner {
    fn touch(&mut self, index: u64) {
        self.order.retain(|&i| i != index);
        self.order.push_front(index);
    }
}

/// Bounded least-recently-used block cache.
pub struct LruBlockCache {
    inner: Mutex<LruInner>,
    capacity: usize,
}

impl LruBlockCache {
    /// Create a cache holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        LruBlockCache {
            inner: Mutex::new(LruInner {
                blocks: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.blocks.len(),
        }
    }
}

impl BlockCache for LruBlockCache {
    fn try_read(&self, index: u64, out: &mut [u8]) -> bool {
        let mut inner = self.inner.lock();
        match inner.blocks.get(&index) {
            Some(block) if block.len() <= out.len() => {
                out[..block.len()].copy_from_slice(block);
                inner.touch(index);
                inner.hits += 1;
                true
            }
            _ => {
                inner.misses += 1;
                false
            }
        }
    }

    fn store(&self, index: u64, block: &[u8]) {
        let mut inner = self.inner.lock();
        inner.blocks.insert(index, block.to_vec());
        inner.touch(index);
        while inner.blocks.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_back() {
                inner.blocks.remove(&evicted);
            } else {
                break;
            }
        }
    }

    fn invalidate(&self, index: u64) {
        let mut inner = self.inner.lock();
        inner.blocks.remove(&index);
        inner.order.retain(|&i| i != index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_then_read() {
        let cache = LruBlockCache::new(4);
        cache.store(7, &[1, 2, 3]);

        let mut out = [0u8; 8];
        assert!(cache.try_read(7, &mut out));
        assert_eq!(&out[..3], &[1, 2, 3]);
    }

    #[test]
    fn test_miss_on_absent_index() {
        let cache = LruBlockCache::new(4);
        let mut out = [0u8; 8];
        assert!(!cache.try_read(0, &mut out));
    }

    #[test]
    fn test_invalidate_drops_entry() {
        let cache = LruBlockCache::new(4);
        cache.store(1, &[9]);
        cache.invalidate(1);

        let mut out = [0u8; 8];
        assert!(!cache.try_read(1, &mut out));
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let cache = LruBlockCache::new(2);
        cache.store(1, &[1]);
        cache.store(2, &[2]);

        // Touch block 1 so block 2 becomes the eviction candidate.
        let mut out = [0u8; 8];
        assert!(cache.try_read(1, &mut out));

        cache.store(3, &[3]);
        assert!(cache.try_read(1, &mut out));
        assert!(!cache.try_read(2, &mut out));
        assert!(cache.try_read(3, &mut out));
    }

    #[test]
    fn test_undersized_output_is_a_miss() {
        let cache = LruBlockCache::new(2);
        cache.store(1, &[1, 2, 3, 4]);

        let mut out = [0u8; 2];
        assert!(!cache.try_read(1, &mut out));
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = LruBlockCache::new(2);
        cache.store(1, &[1]);

        let mut out = [0u8; 8];
        cache.try_read(1, &mut out);
        cache.try_read(2, &mut out);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }
}
