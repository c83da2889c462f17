//! # Core Module
//!
//! The UI-agnostic sample curation engine.
//!
//! ## Modules
//! - `cache` - Byte-budgeted bitmap cache
//! - `similarity` - RMS pixel distance
//! - `store` - Sample storage backends
//! - `pool` - Worker pool used by both phases
//! - `curation` - New-sample deduplication and corpus merging
//! - `pipeline` - Orchestrates a full run with cancellation

pub mod cache;
pub mod curation;
pub mod pipeline;
pub mod pool;
pub mod similarity;
pub mod store;

// Re-export commonly used types
pub use cache::{BoundedImageCache, CacheStats};
pub use curation::{diff_samples, CandidateSet};
pub use pipeline::{CancellationToken, CurationPipeline, CurationReport, PipelineState};
pub use similarity::SimilarityMetric;
pub use store::{FsSampleStore, SampleId, SampleStore};
