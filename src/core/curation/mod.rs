//! # Curation Module
//!
//! The two phases of a curation run.
//!
//! ## Phases
//! 1. `Deduplicator` - removes near-duplicates among new samples
//! 2. `Merger` - drops survivors the corpus already covers and promotes the
//!    rest into the persistent area
//!
//! Both phases take a [`CandidateSet`] and never depend on its iteration
//! order.

mod candidates;
mod dedup;
mod merge;

pub use candidates::CandidateSet;
pub use dedup::{DedupOutcome, Deduplicator};
pub use merge::{MergeOutcome, Merger};

use crate::core::similarity::SimilarityMetric;
use crate::core::store::{SampleId, SampleStore};
use crate::error::CurationError;

/// Distance between two stored samples, computed with the row-sharded metric
pub fn diff_samples(
    store: &dyn SampleStore,
    a: &SampleId,
    b: &SampleId,
    metric: &SimilarityMetric,
) -> Result<f64, CurationError> {
    let left = store.load_image(a)?;
    let right = store.load_image(b)?;
    Ok(metric.distance_parallel(&left, &right)?)
}
