//! # Similarity Module
//!
//! Pixel-level distance between two equally sized RGBA bitmaps.
//!
//! ## Metric
//! Root-mean-square of the per-pixel, per-channel (red, green, blue)
//! differences; alpha is ignored. Two samples are near-duplicates when their
//! distance is below [`NEAR_DUPLICATE_THRESHOLD`].
//!
//! ## Variants
//! - `SimilarityMetric::distance` - single-threaded scan
//! - `SimilarityMetric::distance_parallel` - rows sharded over a fixed number
//!   of rayon tasks; partial sums are added before the square root, so both
//!   variants agree for the same inputs

mod rms;

pub use rms::{DistanceFormula, SimilarityMetric};

/// Distance below which two samples are treated as the same training example.
///
/// Kept at 10 for compatibility with existing corpora.
pub const NEAR_DUPLICATE_THRESHOLD: f64 = 10.0;

/// Number of shards used by the parallel distance: twice the hardware
/// parallelism.
pub fn default_shard_count() -> usize {
    2 * std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
