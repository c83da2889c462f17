//! # Sample Curation
//!
//! Keeps a labeled image training corpus free of near-duplicates.
//!
//! Freshly captured samples land in a "new" area. A curation run first
//! removes near-duplicates among them, then merges the survivors into the
//! persistent corpus, dropping any the corpus already covers.
//!
//! ## Architecture
//! - `core` - The curation engine (cache, metric, stores, phases, pipeline)
//! - `events` - Event-driven progress reporting
//! - `config` - Run settings loaded from JSON
//! - `error` - Error types

pub mod config;
pub mod core;
pub mod error;
pub mod events;

// Re-export commonly used types at the crate root
pub use config::CurationConfig;
pub use error::{CurationError, Result};

/// Initialize tracing for the library
///
/// This should be called by the application entry point. `default_level`
/// applies when `RUST_LOG` is not set. Returns false if a global subscriber
/// was already installed.
pub fn init_tracing(default_level: &str) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).is_ok()
}
