//! # Error Module
//!
//! Error types for the sample curation engine.
//!
//! ## Design Principles
//! - **Never panic** on sample data - return errors instead
//! - **Include context** - sample identifiers, paths, what went wrong
//! - **Local by default** - per-sample failures are logged and skipped by the
//!   phases; only failures that make a whole run impossible reach the caller

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error
#[derive(Error, Debug)]
pub enum CurationError {
    #[error("Sample store error: {0}")]
    Store(#[from] StoreError),

    #[error("Similarity error: {0}")]
    Metric(#[from] MetricError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a sample store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Sample not found: {id}")]
    NotFound { id: String },

    #[error("Failed to decode sample {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("Failed to encode sample {id}: {reason}")]
    Encode { id: String, reason: String },

    #[error("I/O error on sample {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list samples in {path}: {reason}")]
    List { path: PathBuf, reason: String },
}

impl StoreError {
    /// True when the sample simply does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Errors raised while comparing two bitmaps
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("Image dimensions differ: {}x{} vs {}x{}", left.0, left.1, right.0, right.1)]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
}

/// Errors raised by the worker pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Worker pool disconnected before the job could be delivered")]
    Disconnected,
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, CurationError>;
