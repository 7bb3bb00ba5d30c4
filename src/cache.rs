//! Bounded cache of decoded features in front of the store.
//!
//! Keyed by feature id, sharded to keep gets cheap under concurrent query
//! load, least-recently-used eviction within each shard. The cache is an
//! optimization only: every lookup falls back to the store on a miss, and a
//! failed load is returned to the caller without poisoning the cache.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::Result;
use crate::types::Feature;

const SHARD_COUNT: usize = 16;

/// Observable hit/miss counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
}

struct Shard {
    entries: FxHashMap<u32, (Arc<Feature>, u64)>,
    tick: u64,
}

impl Shard {
    fn touch(&mut self, id: u32) -> Option<Arc<Feature>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(&id).map(|slot| {
            slot.1 = tick;
            Arc::clone(&slot.0)
        })
    }

    fn insert(&mut self, id: u32, feature: Arc<Feature>, capacity: usize) {
        if self.entries.len() >= capacity && !self.entries.contains_key(&id) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, (_, tick))| *tick)
                .map(|(k, _)| *k)
            {
                self.entries.remove(&oldest);
            }
        }
        self.tick += 1;
        self.entries.insert(id, (feature, self.tick));
    }
}

/// Sharded LRU over decoded features.
pub struct FeatureCache {
    shards: Vec<Mutex<Shard>>,
    capacity_per_shard: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FeatureCache {
    /// A cache holding roughly `capacity` features.
    pub fn new(capacity: usize) -> FeatureCache {
        let capacity_per_shard = capacity.div_ceil(SHARD_COUNT).max(1);
        let shards = (0..SHARD_COUNT)
            .map(|_| {
                Mutex::new(Shard {
                    entries: FxHashMap::default(),
                    tick: 0,
                })
            })
            .collect();
        FeatureCache {
            shards,
            capacity_per_shard,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn shard(&self, id: u32) -> &Mutex<Shard> {
        &self.shards[id as usize % SHARD_COUNT]
    }

    /// Returns the cached feature or loads, caches, and returns it. `load`
    /// runs outside the shard lock, so a slow decode never blocks readers of
    /// other ids in the same shard longer than the map operations.
    pub fn get_or_load<F>(&self, id: u32, load: F) -> Result<Arc<Feature>>
    where
        F: FnOnce() -> Result<Feature>,
    {
        if let Some(found) = self.shard(id).lock().touch(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let feature = Arc::new(load()?);
        self.shard(id)
            .lock()
            .insert(id, Arc::clone(&feature), self.capacity_per_shard);
        Ok(feature)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: self.shards.iter().map(|s| s.lock().entries.len()).sum(),
        }
    }
}
