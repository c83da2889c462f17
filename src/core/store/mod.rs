//! # Store Module
//!
//! Access to labeled sample bitmaps.
//!
//! The curation engine only talks to the [`SampleStore`] trait and treats
//! identifiers as opaque. Parsing the naming convention and deciding where a
//! promoted sample lands is the store's job.
//!
//! ## Backends
//! - `FsSampleStore` - New and persistent areas as directories of PNG files
//! - `InMemorySampleStore` - For testing; records every mutating call
//! - `CachingStore` - Wraps any store and serves loads from a
//!   `BoundedImageCache`

mod caching;
mod fs;
mod memory;
mod naming;
mod traits;

pub use caching::CachingStore;
pub use fs::{FsSampleStore, DEFAULT_NEW_DIR, DEFAULT_PERSISTENT_DIR};
pub use memory::{InMemorySampleStore, StoreCall};
pub use naming::{Label, SampleName, SAMPLE_FORMAT};
pub use traits::SampleStore;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opaque identifier of one sample (a storage path for `FsSampleStore`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for a file path
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component of the identifier, used when a sample moves
    /// between areas.
    pub fn base_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.0)
    }
}

impl std::fmt::Display for SampleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SampleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SampleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for SampleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
