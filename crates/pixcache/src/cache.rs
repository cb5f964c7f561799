//! ImageCache: bounded, thread-safe image store

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::ImageHandle;
use crate::key::CacheKey;
use crate::lru::CostLru;
use crate::stats::{CacheSnapshot, CacheStats};

/// Default maximum number of cached images
pub const DEFAULT_MAX_COUNT: usize = 200;

/// Default maximum total cost (100 MiB of pixels)
pub const DEFAULT_MAX_COST: usize = 100 * 1024 * 1024;

/// Capacity limits; eviction runs when either is exceeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    /// Maximum number of entries
    pub max_count: usize,
    /// Maximum sum of entry costs
    pub max_cost: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

impl CacheLimits {
    /// Limits with the given count and cost
    pub const fn new(max_count: usize, max_cost: usize) -> Self {
        Self {
            max_count,
            max_cost,
        }
    }

    /// Check both limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_count == 0 {
            return Err(Error::InvalidConfig(
                "max_count must be greater than 0".to_string(),
            ));
        }
        if self.max_cost == 0 {
            return Err(Error::InvalidConfig(
                "max_cost must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory image cache with LRU eviction bounded by count and cost
///
/// All mutation, including the recency update on `get`, goes through the
/// write side of one lock. Entry count and total cost are copied as one
/// pair into a separate snapshot lock while that write lock is still held,
/// so [`ImageCache::stats`] never waits on the entries and never sees a
/// count from one mutation paired with a cost from another.
///
/// Lock order: `entries`, then `snapshot`.
pub struct ImageCache {
    entries: RwLock<CostLru<CacheKey, ImageHandle>>,
    snapshot: Mutex<CacheSnapshot>,
    stats: CacheStats,
    limits: CacheLimits,
}

impl ImageCache {
    /// Create an empty cache
    pub fn new(limits: CacheLimits) -> Result<Self> {
        limits.validate()?;

        Ok(Self {
            entries: RwLock::new(CostLru::new(limits.max_count, limits.max_cost)),
            snapshot: Mutex::new(CacheSnapshot::default()),
            stats: CacheStats::new(),
            limits,
        })
    }

    /// Look up an image, marking it most recently used on a hit
    pub fn get(&self, key: &CacheKey) -> Option<ImageHandle> {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(image) => {
                self.stats.record_hit();
                Some(ImageHandle::clone(image))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Look up an image without touching recency or counters
    pub fn peek(&self, key: &CacheKey) -> Option<ImageHandle> {
        self.entries.read().peek(key).map(ImageHandle::clone)
    }

    /// Check for an entry without touching recency or counters
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().peek(key).is_some()
    }

    /// Insert or replace an image, evicting least recently used entries
    /// until both limits hold again
    pub fn put(&self, key: CacheKey, image: ImageHandle) {
        let cost = image.cost();
        let mut entries = self.entries.write();

        let evicted = entries.put(key, image, cost);
        self.stats.record_insert();
        if evicted > 0 {
            debug!("Evicted {} image(s) after insert of cost {}", evicted, cost);
            self.stats.record_evictions(evicted as u64);
        }

        self.publish(&entries);
    }

    /// Remove one entry if present
    pub fn remove(&self, key: &CacheKey) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.publish(&entries);
        }
    }

    /// Drop every entry. Safe to call from a memory-pressure handler.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.clear();
        self.stats.record_clear();
        self.publish(&entries);
    }

    /// Current entry count and total cost
    pub fn stats(&self) -> CacheSnapshot {
        *self.snapshot.lock()
    }

    /// Hit, miss and eviction counters
    pub fn counters(&self) -> &CacheStats {
        &self.stats
    }

    /// Configured limits
    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.snapshot.lock().count
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Called with the entries write lock held
    fn publish(&self, entries: &CostLru<CacheKey, ImageHandle>) {
        *self.snapshot.lock() = CacheSnapshot {
            count: entries.len(),
            total_cost: entries.total_cost(),
        };
    }
}
