//! # Config Module
//!
//! Settings of a curation run, read from a JSON file.
//!
//! Every field has a default, so a partial file (or none at all) is valid.
//! The CLI overrides individual values after loading.

use crate::core::cache::DEFAULT_CACHE_BUDGET_BYTES;
use crate::core::pool::default_pool_size;
use crate::core::similarity::{DistanceFormula, SimilarityMetric, NEAR_DUPLICATE_THRESHOLD};
use crate::core::store::{FsSampleStore, DEFAULT_NEW_DIR, DEFAULT_PERSISTENT_DIR};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings for a curation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    /// Directory holding freshly captured samples
    pub new_dir: PathBuf,
    /// Directory holding the curated corpus
    pub persistent_dir: PathBuf,
    /// Byte budget of the bitmap cache
    pub cache_budget_bytes: usize,
    /// Distance below which two samples are near-duplicates
    pub near_duplicate_threshold: f64,
    /// Workers of the deduplication pool; hardware parallelism when unset
    pub dedup_workers: Option<usize>,
    /// Workers of the corpus search pool; twice the hardware parallelism when unset
    pub search_workers: Option<usize>,
    pub distance_formula: DistanceFormula,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            new_dir: PathBuf::from(DEFAULT_NEW_DIR),
            persistent_dir: PathBuf::from(DEFAULT_PERSISTENT_DIR),
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            near_duplicate_threshold: NEAR_DUPLICATE_THRESHOLD,
            dedup_workers: None,
            search_workers: None,
            distance_formula: DistanceFormula::default(),
        }
    }
}

impl CurationConfig {
    /// Default config file: `<config dir>/sample-curation/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("sample-curation").join("config.json"))
    }

    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the default file if it exists,
    /// otherwise defaults. An explicitly named file must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let Some(default_path) = Self::default_path() else {
            return Ok(Self::default());
        };
        match Self::load(&default_path) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(path = %default_path.display(), "no config file; using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.near_duplicate_threshold.is_finite() || self.near_duplicate_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "near_duplicate_threshold must be a positive number, got {}",
                self.near_duplicate_threshold
            )));
        }
        if self.dedup_workers == Some(0) {
            return Err(ConfigError::Invalid("dedup_workers must be at least 1".to_string()));
        }
        if self.search_workers == Some(0) {
            return Err(ConfigError::Invalid("search_workers must be at least 1".to_string()));
        }
        if self.new_dir == self.persistent_dir {
            return Err(ConfigError::Invalid(format!(
                "new_dir and persistent_dir must differ, both are {}",
                self.new_dir.display()
            )));
        }
        Ok(())
    }

    pub fn dedup_workers(&self) -> usize {
        self.dedup_workers.unwrap_or_else(default_pool_size)
    }

    pub fn search_workers(&self) -> usize {
        self.search_workers.unwrap_or_else(|| 2 * default_pool_size())
    }

    /// Metric configured with this threshold and formula
    pub fn metric(&self) -> SimilarityMetric {
        SimilarityMetric::new()
            .with_formula(self.distance_formula)
            .with_threshold(self.near_duplicate_threshold)
    }

    /// Filesystem store over the configured directories
    pub fn store(&self) -> FsSampleStore {
        FsSampleStore::new(&self.new_dir, &self.persistent_dir)
    }
}
