//! # Chunk Cache
//!
//! Bounded store of generated chunks, kept LZ4-compressed.
//!
//! Generation is pure, so a cached chunk is only a shortcut: evicting one
//! never loses data. Entries are keyed by (seed, coordinate) and evicted in
//! insertion order once the cache is full.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chunk::{Chunk, ChunkCoord};
use crate::noise::WorldSeed;

type CacheKey = (WorldSeed, ChunkCoord);

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, Arc<[u8]>>,
    order: VecDeque<CacheKey>,
    bytes: usize,
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// Chunks held.
    pub entries: usize,
    /// Compressed bytes held.
    pub bytes: usize,
}

/// Thread-safe FIFO cache of compressed chunks.
pub struct ChunkCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ChunkCache {
    /// Creates a cache holding at most `capacity` chunks.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns a copy of a cached chunk.
    #[must_use]
    pub fn get(&self, seed: WorldSeed, coord: ChunkCoord) -> Option<Chunk> {
        let data = self.inner.read().entries.get(&(seed, coord)).map(Arc::clone);
        let Some(data) = data else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        match Chunk::from_compressed(coord, &data) {
            Ok(chunk) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(chunk)
            }
            Err(e) => {
                tracing::warn!("Cached chunk {} is unreadable, dropping it: {}", coord, e);
                self.remove(seed, coord);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores a chunk, evicting the oldest entries beyond capacity.
    pub fn insert(&self, seed: WorldSeed, chunk: &Chunk) {
        let key = (seed, chunk.coord());
        let data: Arc<[u8]> = Arc::from(chunk.to_compressed());

        let mut inner = self.inner.write();
        inner.bytes += data.len();
        if let Some(old) = inner.entries.insert(key, data) {
            inner.bytes -= old.len();
        } else {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.bytes -= evicted.len();
            }
        }
    }

    /// Drops one entry. Returns true if it was present.
    pub fn remove(&self, seed: WorldSeed, coord: ChunkCoord) -> bool {
        let mut inner = self.inner.write();
        let Some(data) = inner.entries.remove(&(seed, coord)) else {
            return false;
        };
        inner.bytes -= data.len();
        inner.order.retain(|key| *key != (seed, coord));
        true
    }

    /// Keeps only chunks whose coordinate passes `keep`. Returns the number
    /// dropped.
    pub fn retain(&self, mut keep: impl FnMut(ChunkCoord) -> bool) -> usize {
        let mut inner = self.inner.write();
        let before = inner.entries.len();
        let CacheInner {
            entries,
            order,
            bytes,
        } = &mut *inner;
        entries.retain(|&(_, coord), data| {
            let kept = keep(coord);
            if !kept {
                *bytes -= data.len();
            }
            kept
        });
        order.retain(|key| entries.contains_key(key));
        before - entries.len()
    }

    /// Drops everything.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
        inner.bytes = 0;
    }

    /// Number of cached chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: inner.entries.len(),
            bytes: inner.bytes,
        }
    }
}

impl std::fmt::Debug for ChunkCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkCache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{MaterialId, BLOCKS_PER_CHUNK};

    fn chunk(x: i32) -> Chunk {
        let mut chunk = Chunk::new(ChunkCoord::new(x, 0));
        for y in 0..32 {
            chunk.set(1, y, 1, MaterialId(4));
        }
        chunk.recompute_heights();
        chunk
    }

    #[test]
    fn test_get_returns_identical_chunk() {
        let cache = ChunkCache::new(4);
        let seed = WorldSeed::new(9);
        cache.insert(seed, &chunk(0));

        let cached = cache.get(seed, ChunkCoord::new(0, 0)).unwrap();
        assert_eq!(cached, chunk(0));
        assert!(cache.get(WorldSeed::new(10), ChunkCoord::new(0, 0)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        println!(
            "Compressed {} bytes to {} ({:.1}x)",
            BLOCKS_PER_CHUNK * 2,
            stats.bytes,
            (BLOCKS_PER_CHUNK * 2) as f64 / stats.bytes as f64
        );
        assert!(stats.bytes < BLOCKS_PER_CHUNK / 10);
    }

    #[test]
    fn test_fifo_eviction() {
        let cache = ChunkCache::new(2);
        let seed = WorldSeed::new(1);
        for x in 0..3 {
            cache.insert(seed, &chunk(x));
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(seed, ChunkCoord::new(0, 0)).is_none());
        assert!(cache.get(seed, ChunkCoord::new(2, 0)).is_some());
    }

    #[test]
    fn test_reinsert_does_not_duplicate() {
        let cache = ChunkCache::new(2);
        let seed = WorldSeed::new(1);
        cache.insert(seed, &chunk(0));
        cache.insert(seed, &chunk(0));
        cache.insert(seed, &chunk(1));
        assert_eq!(cache.len(), 2);
        assert!(cache.remove(seed, ChunkCoord::new(0, 0)));
        assert!(!cache.remove(seed, ChunkCoord::new(0, 0)));
        assert_eq!(cache.len(), 1);
    }
}
