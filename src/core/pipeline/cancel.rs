//! Cooperative cancellation shared by every phase of a run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cancellation flag checked at batch, pivot and item boundaries.
///
/// Clones share the same flag, so a token handed to a Ctrl+C handler or a
/// UI thread cancels the run that holds the other clone. Cancelling is not an
/// error: phases return normally with whatever they already decided.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
