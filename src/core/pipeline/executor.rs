//! Pipeline controller implementation.

use super::CancellationToken;
use crate::config::CurationConfig;
use crate::core::cache::{BoundedImageCache, CacheStats, DEFAULT_CACHE_BUDGET_BYTES};
use crate::core::curation::{diff_samples, CandidateSet, Deduplicator, Merger};
use crate::core::pool::default_pool_size;
use crate::core::similarity::{DistanceFormula, SimilarityMetric};
use crate::core::store::{CachingStore, FsSampleStore, SampleId, SampleStore, DEFAULT_NEW_DIR, DEFAULT_PERSISTENT_DIR};
use crate::error::{ConfigError, CurationError};
use crate::events::{
    null_sender, CurationSummary, Event, EventSender, PipelineEvent, PipelinePhase,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::info;

/// Lifecycle of a curation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Idle,
    RunningDedup,
    RunningMerge,
    Done,
    Cancelled,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::RunningDedup => write!(f, "deduplicating"),
            PipelineState::RunningMerge => write!(f, "merging"),
            PipelineState::Done => write!(f, "done"),
            PipelineState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Result of a curation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationReport {
    /// `Done` or `Cancelled`
    pub state: PipelineState,
    pub summary: CurationSummary,
    /// New samples deleted as near-duplicates of other new samples
    pub deleted: Vec<SampleId>,
    /// New samples deleted because the corpus already covered them
    pub discarded: Vec<SampleId>,
    /// Persistent identifiers of promoted samples
    pub promoted: Vec<SampleId>,
    /// Per-sample failures that were logged and skipped
    pub failures: Vec<String>,
    /// Cache counters at the end of the run
    pub cache: CacheStats,
}

impl CurationReport {
    pub fn is_cancelled(&self) -> bool {
        self.state == PipelineState::Cancelled
    }
}

/// Builder for the curation pipeline
pub struct PipelineBuilder {
    store: Option<Box<dyn SampleStore>>,
    cache_budget_bytes: usize,
    metric: SimilarityMetric,
    dedup_workers: usize,
    search_workers: usize,
}

impl PipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            store: None,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            metric: SimilarityMetric::new(),
            dedup_workers: default_pool_size(),
            search_workers: 2 * default_pool_size(),
        }
    }

    /// Apply every setting of `config`, including its filesystem store
    pub fn config(self, config: &CurationConfig) -> Self {
        self.store(config.store())
            .cache_budget(config.cache_budget_bytes)
            .metric(config.metric())
            .dedup_workers(config.dedup_workers())
            .search_workers(config.search_workers())
    }

    /// Set the sample store. Loads are routed through the pipeline's cache.
    pub fn store(mut self, store: impl SampleStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    /// Set the cache byte budget
    pub fn cache_budget(mut self, bytes: usize) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    /// Set the similarity metric
    pub fn metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the near-duplicate threshold
    pub fn threshold(mut self, threshold: f64) -> Self {
        self.metric = self.metric.with_threshold(threshold);
        self
    }

    /// Set the distance formula
    pub fn formula(mut self, formula: DistanceFormula) -> Self {
        self.metric = self.metric.with_formula(formula);
        self
    }

    /// Set the deduplication pool size
    pub fn dedup_workers(mut self, workers: usize) -> Self {
        self.dedup_workers = workers.max(1);
        self
    }

    /// Set the corpus search pool size
    pub fn search_workers(mut self, workers: usize) -> Self {
        self.search_workers = workers.max(1);
        self
    }

    /// Build the pipeline
    pub fn build(self) -> CurationPipeline {
        let cache = Arc::new(BoundedImageCache::new(self.cache_budget_bytes));
        let inner = self
            .store
            .unwrap_or_else(|| Box::new(FsSampleStore::new(DEFAULT_NEW_DIR, DEFAULT_PERSISTENT_DIR)));
        let store: Arc<dyn SampleStore> = Arc::new(CachingStore::new(inner, Arc::clone(&cache)));

        CurationPipeline {
            store,
            cache,
            metric: Arc::new(self.metric),
            dedup_workers: self.dedup_workers,
            search_workers: self.search_workers,
            state: Mutex::new(PipelineState::Idle),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cleans the new-sample area and merges it into the persistent corpus
pub struct CurationPipeline {
    store: Arc<dyn SampleStore>,
    cache: Arc<BoundedImageCache>,
    metric: Arc<SimilarityMetric>,
    dedup_workers: usize,
    search_workers: usize,
    state: Mutex<PipelineState>,
}

impl CurationPipeline {
    /// Create a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Pipeline over the filesystem store described by `config`
    pub fn from_config(config: &CurationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(PipelineBuilder::new().config(config).build())
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached store every phase reads through
    pub fn store(&self) -> &Arc<dyn SampleStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<BoundedImageCache> {
        &self.cache
    }

    pub fn metric(&self) -> &SimilarityMetric {
        &self.metric
    }

    /// Distance between two stored samples
    pub fn diff(&self, a: &SampleId, b: &SampleId) -> Result<f64, CurationError> {
        diff_samples(self.store.as_ref(), a, b, &self.metric)
    }

    /// Run the pipeline without events
    pub fn run(&self, token: &CancellationToken) -> Result<CurationReport, CurationError> {
        self.run_with_events(token, &null_sender())
    }

    /// Run the pipeline with event reporting.
    ///
    /// Returns an error only when a sample area cannot be listed or a worker
    /// pool cannot be started; the state then falls back to `Idle`.
    pub fn run_with_events(
        &self,
        token: &CancellationToken,
        events: &EventSender,
    ) -> Result<CurationReport, CurationError> {
        let result = self.execute(token, events);
        if result.is_err() {
            self.set_state(PipelineState::Idle);
        }
        result
    }

    fn execute(&self, token: &CancellationToken, events: &EventSender) -> Result<CurationReport, CurationError> {
        let start_time = Instant::now();
        self.set_state(PipelineState::RunningDedup);

        let new_samples = self.store.list_new()?;
        let persistent_samples = self.store.list_persistent()?.len();
        let total = new_samples.len();
        info!(new_samples = total, persistent_samples, "curation started");

        events.send(Event::Pipeline(PipelineEvent::Started {
            new_samples: total,
            persistent_samples,
        }));

        // Phase 1: Deduplicating
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Deduplicating,
        }));
        let dedup = Deduplicator::new(Arc::clone(&self.store), Arc::clone(&self.metric), self.dedup_workers)
            .with_events(events.clone())
            .run(new_samples.into_iter().collect(), token)?;

        // Phase 2: Merging
        self.set_state(PipelineState::RunningMerge);
        events.send(Event::Pipeline(PipelineEvent::PhaseChanged {
            phase: PipelinePhase::Merging,
        }));
        let survivors: CandidateSet = dedup.survivors.iter().cloned().collect();
        let merge = Merger::new(Arc::clone(&self.store), Arc::clone(&self.metric), self.search_workers)
            .with_events(events.clone())
            .run(survivors, token)?;

        let state = if token.is_cancelled() {
            PipelineState::Cancelled
        } else {
            PipelineState::Done
        };
        self.set_state(state);

        let mut failures = dedup.failures;
        failures.extend(merge.failures);
        let summary = CurationSummary {
            new_samples: total,
            duplicates_removed: dedup.deleted.len(),
            redundant_with_corpus: merge.discarded.len(),
            promoted: merge.promoted.len(),
            failures: failures.len(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        info!(%state, ?summary, "curation finished");

        let finished = match state {
            PipelineState::Cancelled => PipelineEvent::Cancelled {
                summary: summary.clone(),
            },
            _ => PipelineEvent::Completed {
                summary: summary.clone(),
            },
        };
        events.send(Event::Pipeline(finished));

        Ok(CurationReport {
            state,
            summary,
            deleted: dedup.deleted,
            discarded: merge.discarded,
            promoted: merge.promoted,
            failures,
            cache: self.cache.stats(),
        })
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
