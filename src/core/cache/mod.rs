//! # Cache Module
//!
//! Keeps decoded sample bitmaps in memory so the curation phases don't
//! decode the same PNG over and over.
//!
//! ## Behaviour
//! - A single byte budget bounds the sum of all cached pixel buffers
//! - Entries carry a popularity counter; the least popular entry is evicted
//!   first when room is needed
//! - Callers always get and give private copies of the pixel data
//!
//! ## Backends
//! - `BoundedImageCache` - Mutex-guarded budgeted cache, shared by all workers

mod bounded;

pub use bounded::{BoundedImageCache, POPULARITY_CEILING};

use serde::{Deserialize, Serialize};

/// Default cache budget (512 MiB)
pub const DEFAULT_CACHE_BUDGET_BYTES: usize = 512 * 1024 * 1024;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of cached bitmaps
    pub entries: usize,
    /// Bytes currently held by cached pixel buffers
    pub used_bytes: usize,
    /// Configured byte ceiling
    pub budget_bytes: usize,
    /// Whether the last admission had to evict other entries
    pub degraded: bool,
    /// Successful lookups
    pub hits: u64,
    /// Lookups for identifiers that were not cached
    pub misses: u64,
    /// Entries evicted to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from memory (0.0 when nothing was looked up)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}
