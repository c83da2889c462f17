//! Byte-budgeted bitmap cache with popularity-based eviction.

use super::CacheStats;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Popularity counters never reach this value: the increment that would hit
/// it halves every counter in the cache instead.
pub const POPULARITY_CEILING: u32 = 1 << 16;

struct CachedImage {
    image: RgbaImage,
    popularity: u32,
}

impl CachedImage {
    fn size_bytes(&self) -> usize {
        self.image.as_raw().len()
    }
}

struct CacheState {
    budget_bytes: usize,
    used_bytes: usize,
    entries: HashMap<String, CachedImage>,
    degraded: bool,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheState {
    /// Evict the least popular entry other than `exclude`.
    ///
    /// Returns false when there was nothing left to evict.
    fn evict_least_popular(&mut self, exclude: Option<&str>) -> bool {
        let victim = self
            .entries
            .iter()
            .filter(|(key, _)| Some(key.as_str()) != exclude)
            .min_by_key(|(_, entry)| entry.popularity)
            .map(|(key, _)| key.clone());

        let Some(victim) = victim else {
            return false;
        };

        if let Some(entry) = self.entries.remove(&victim) {
            let freed = entry.size_bytes();
            self.used_bytes -= freed;
            self.evictions += 1;
            debug!(id = %victim, freed, popularity = entry.popularity, "evicted cached image");
        }
        true
    }

    fn halve_popularity(&mut self) {
        for entry in self.entries.values_mut() {
            entry.popularity /= 2;
        }
        debug!(entries = self.entries.len(), "halved cache popularity counters");
    }
}

/// Bounded in-memory cache of decoded sample bitmaps.
///
/// All operations are serialized by one mutex, so a single instance can be
/// shared (behind an `Arc`) by every worker of a curation run.
pub struct BoundedImageCache {
    state: Mutex<CacheState>,
    popularity_ceiling: u32,
}

impl BoundedImageCache {
    /// Create an empty cache holding at most `budget_bytes` of pixel data
    pub fn new(budget_bytes: usize) -> Self {
        Self::with_popularity_ceiling(budget_bytes, POPULARITY_CEILING)
    }

    pub(crate) fn with_popularity_ceiling(budget_bytes: usize, popularity_ceiling: u32) -> Self {
        Self {
            state: Mutex::new(CacheState {
                budget_bytes,
                used_bytes: 0,
                entries: HashMap::new(),
                degraded: false,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            popularity_ceiling: popularity_ceiling.max(2),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Every mutation completes before the guard is released, so a
        // poisoned lock still guards consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a bitmap, returning a private copy.
    ///
    /// A hit bumps the entry's popularity.
    pub fn get(&self, id: &str) -> Option<RgbaImage> {
        let mut state = self.lock();
        let ceiling = self.popularity_ceiling;

        let Some(entry) = state.entries.get_mut(id) else {
            state.misses += 1;
            return None;
        };

        let image = entry.image.clone();
        entry.popularity = entry.popularity.saturating_add(1);
        let saturated = entry.popularity >= ceiling;

        state.hits += 1;
        if saturated {
            state.halve_popularity();
        }
        Some(image)
    }

    /// Store a private copy of `image` under `id`.
    ///
    /// Bitmaps larger than the whole budget are not cached; a stale entry for
    /// the same `id` is dropped so later lookups fall through to the store.
    /// Otherwise the least popular other entries are evicted until the new
    /// content fits.
    pub fn put(&self, id: &str, image: &RgbaImage) {
        let new_size = image.as_raw().len();
        let mut state = self.lock();

        if new_size > state.budget_bytes {
            if let Some(stale) = state.entries.remove(id) {
                state.used_bytes -= stale.size_bytes();
            }
            debug!(id, new_size, budget = state.budget_bytes, "image exceeds cache budget, bypassing cache");
            return;
        }

        let old_size = state.entries.get(id).map(CachedImage::size_bytes);
        let mut evicted = false;

        loop {
            let used_without_old = state.used_bytes - old_size.unwrap_or(0);
            if used_without_old + new_size <= state.budget_bytes {
                match state.entries.get_mut(id) {
                    Some(entry) => entry.image = image.clone(),
                    None => {
                        state.entries.insert(
                            id.to_string(),
                            CachedImage {
                                image: image.clone(),
                                popularity: 0,
                            },
                        );
                    }
                }
                state.used_bytes = used_without_old + new_size;
                if state.degraded != evicted {
                    debug!(degraded = evicted, "cache balance changed");
                }
                state.degraded = evicted;
                return;
            }

            evicted = true;
            state.degraded = true;

            if !state.evict_least_popular(Some(id)) {
                if let Some(old) = state.entries.remove(id) {
                    state.used_bytes -= old.size_bytes();
                }
                return;
            }
        }
    }

    /// Remove the entry for `id`, releasing its bytes from the budget
    pub fn delete(&self, id: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.remove(id) {
            state.used_bytes -= entry.size_bytes();
        }
    }

    /// Change the byte ceiling, evicting unpopular entries if it shrank
    pub fn set_budget(&self, budget_bytes: usize) {
        let mut state = self.lock();
        state.budget_bytes = budget_bytes;
        while state.used_bytes > state.budget_bytes {
            state.degraded = true;
            if !state.evict_least_popular(None) {
                break;
            }
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.used_bytes = 0;
        state.degraded = false;
    }

    /// Whether `id` is currently cached. Does not count as a lookup.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Number of cached bitmaps
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no bitmaps
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Bytes currently held
    pub fn used_bytes(&self) -> usize {
        self.lock().used_bytes
    }

    /// Configured byte ceiling
    pub fn budget_bytes(&self) -> usize {
        self.lock().budget_bytes
    }

    /// Whether the most recent admission needed evictions
    pub fn is_degraded(&self) -> bool {
        self.lock().degraded
    }

    /// Snapshot of the cache counters
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            used_bytes: state.used_bytes,
            budget_bytes: state.budget_bytes,
            degraded: state.degraded,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
        }
    }

    #[cfg(test)]
    fn popularity(&self, id: &str) -> Option<u32> {
        self.lock().entries.get(id).map(|entry| entry.popularity)
    }

    #[cfg(test)]
    fn cached_sizes(&self) -> usize {
        self.lock().entries.values().map(CachedImage::size_bytes).sum()
    }
}
