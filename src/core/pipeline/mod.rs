//! # Pipeline Module
//!
//! Drives a full curation run.
//!
//! ## Pipeline Stages
//! 1. **Deduplicate** - Remove near-duplicates among the new samples
//! 2. **Merge** - Drop survivors the corpus already holds, promote the rest
//!
//! ## State
//! `Idle → RunningDedup → RunningMerge → Done`, or `Cancelled` when the
//! token fired during either phase. The merge phase always runs after
//! deduplication; a cancelled token makes it return at its first checkpoint.

mod cancel;
mod executor;

pub use cancel::CancellationToken;
pub use executor::{CurationPipeline, CurationReport, PipelineBuilder, PipelineState};
