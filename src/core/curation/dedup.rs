//! Near-duplicate removal within the new-sample area.
//!
//! Large sets are thinned in batches: a batch of `workers` samples is first
//! deduplicated among itself, then every batch member scans the rest of the
//! set on its own pool worker. Matches are deleted once the whole batch has
//! reported. When no more than `workers` samples remain, the tail is finished
//! with a plain pivot loop on the calling thread.

use super::CandidateSet;
use crate::core::pipeline::CancellationToken;
use crate::core::pool::WorkerPool;
use crate::core::similarity::SimilarityMetric;
use crate::core::store::{SampleId, SampleStore};
use crate::error::{MetricError, PoolError};
use crate::events::{null_sender, percent, DedupEvent, Event, EventSender, PercentThrottle};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one deduplication pass
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Samples kept. Unless the pass was cancelled, no two comparable
    /// survivors are near-duplicates of each other.
    pub survivors: Vec<SampleId>,
    /// Samples removed from the new area
    pub deleted: Vec<SampleId>,
    /// Per-sample failures, already logged
    pub failures: Vec<String>,
    /// Stopped at a cancellation checkpoint
    pub cancelled: bool,
}

/// Removes near-duplicates among the samples of the new area
pub struct Deduplicator {
    store: Arc<dyn SampleStore>,
    metric: Arc<SimilarityMetric>,
    workers: usize,
    events: EventSender,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn SampleStore>, metric: Arc<SimilarityMetric>, workers: usize) -> Self {
        Self {
            store,
            metric,
            workers: workers.max(1),
            events: null_sender(),
        }
    }

    /// Report progress and deletions on `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Deduplicate `candidates`.
    ///
    /// Cancellation is checked before each batch and before each pivot of
    /// the final loop; decisions made so far are kept.
    pub fn run(&self, candidates: CandidateSet, token: &CancellationToken) -> Result<DedupOutcome, PoolError> {
        let total = candidates.len();
        info!(total, workers = self.workers, "deduplicating new samples");
        self.events.send(Event::Dedup(DedupEvent::Started { total }));

        let mut pass = Pass::new(self, total);
        let mut remaining = candidates;

        if remaining.len() > self.workers {
            pass.batched(&mut remaining, token)?;
        }
        let tail = pass.pivot_loop(remaining, token, true);
        pass.outcome.survivors.extend(tail);
        pass.outcome.cancelled = token.is_cancelled();

        let outcome = pass.outcome;
        info!(
            survivors = outcome.survivors.len(),
            deleted = outcome.deleted.len(),
            failures = outcome.failures.len(),
            cancelled = outcome.cancelled,
            "deduplication finished"
        );
        self.events.send(Event::Dedup(DedupEvent::Completed {
            survivors: outcome.survivors.len(),
            deleted: outcome.deleted.len(),
        }));
        Ok(outcome)
    }
}

/// One pivot's scan over a snapshot of the remaining candidates
struct ScanJob {
    pivot: SampleId,
    candidates: Arc<[SampleId]>,
    /// Candidates already claimed as near-duplicates by some pivot
    marks: Arc<[AtomicBool]>,
    token: CancellationToken,
}

struct ScanReport {
    pivot: SampleId,
    pivot_error: Option<String>,
    matches: Vec<(SampleId, f64)>,
    unreadable: Vec<(SampleId, String)>,
    mismatched: Vec<(SampleId, MetricError)>,
}

fn scan(store: &dyn SampleStore, metric: &SimilarityMetric, job: ScanJob) -> ScanReport {
    let mut report = ScanReport {
        pivot: job.pivot,
        pivot_error: None,
        matches: Vec::new(),
        unreadable: Vec::new(),
        mismatched: Vec::new(),
    };

    let pivot_image = match store.load_image(&report.pivot) {
        Ok(image) => image,
        Err(e) => {
            report.pivot_error = Some(e.to_string());
            return report;
        }
    };

    for (candidate, mark) in job.candidates.iter().zip(job.marks.iter()) {
        if job.token.is_cancelled() {
            break;
        }
        if mark.load(Ordering::Acquire) {
            continue;
        }
        let image = match store.load_image(candidate) {
            Ok(image) => image,
            Err(e) => {
                report.unreadable.push((candidate.clone(), e.to_string()));
                continue;
            }
        };
        match metric.distance(&pivot_image, &image) {
            Ok(distance) if metric.is_near_duplicate(distance) => {
                if !mark.swap(true, Ordering::AcqRel) {
                    report.matches.push((candidate.clone(), distance));
                }
            }
            Ok(_) => {}
            Err(e) => report.mismatched.push((candidate.clone(), e)),
        }
    }
    report
}

/// Bookkeeping for a single `Deduplicator::run`
struct Pass<'a> {
    dedup: &'a Deduplicator,
    outcome: DedupOutcome,
    skipped: HashSet<SampleId>,
    throttle: PercentThrottle,
    total: usize,
}

impl<'a> Pass<'a> {
    fn new(dedup: &'a Deduplicator, total: usize) -> Self {
        Self {
            dedup,
            outcome: DedupOutcome::default(),
            skipped: HashSet::new(),
            throttle: PercentThrottle::new(),
            total,
        }
    }

    fn batched(&mut self, remaining: &mut CandidateSet, token: &CancellationToken) -> Result<(), PoolError> {
        let store = Arc::clone(&self.dedup.store);
        let metric = Arc::clone(&self.dedup.metric);
        let mut pool = WorkerPool::spawn("dedup", self.dedup.workers, move |job: ScanJob| {
            scan(store.as_ref(), &metric, job)
        })?;

        while remaining.len() > self.dedup.workers {
            if token.is_cancelled() {
                break;
            }

            let batch: CandidateSet = remaining.take_batch(self.dedup.workers).into_iter().collect();
            // The batch is small; finish it even if cancellation arrives meanwhile
            let pivots = self.pivot_loop(batch, &CancellationToken::new(), false);

            let candidates: Arc<[SampleId]> = Arc::from(remaining.snapshot());
            let marks: Arc<[AtomicBool]> = candidates.iter().map(|_| AtomicBool::new(false)).collect();

            let mut reports = Vec::with_capacity(pivots.len());
            for pivot in &pivots {
                reports.extend(pool.submit(ScanJob {
                    pivot: pivot.clone(),
                    candidates: Arc::clone(&candidates),
                    marks: Arc::clone(&marks),
                    token: token.clone(),
                })?);
            }
            reports.extend(pool.drain());

            for report in reports {
                self.apply(report, remaining);
            }
            self.outcome.survivors.extend(pivots);
            self.progress(remaining.len());
        }

        pool.shutdown();
        Ok(())
    }

    fn apply(&mut self, report: ScanReport, remaining: &mut CandidateSet) {
        if let Some(reason) = report.pivot_error {
            self.skip(&report.pivot, reason);
        }
        for (id, reason) in report.unreadable {
            self.skip(&id, reason);
        }
        for (candidate, error) in &report.mismatched {
            self.not_comparable(&report.pivot, candidate, error);
        }
        for (id, distance) in report.matches {
            if remaining.remove(&id) {
                self.remove_duplicate(id, &report.pivot, distance);
            }
        }
    }

    /// Exhaustive pivot loop: the popped pivot survives and every remaining
    /// near-duplicate of it is deleted. Returns the survivors, including any
    /// samples left unsettled by cancellation.
    fn pivot_loop(&mut self, mut pending: CandidateSet, token: &CancellationToken, report_progress: bool) -> Vec<SampleId> {
        let mut survivors = Vec::with_capacity(pending.len());

        while pending.len() > 1 {
            if token.is_cancelled() {
                break;
            }
            let Some(pivot) = pending.pop_any() else {
                break;
            };

            let pivot_image = match self.dedup.store.load_image(&pivot) {
                Ok(image) => image,
                Err(e) => {
                    self.skip(&pivot, e.to_string());
                    survivors.push(pivot);
                    continue;
                }
            };

            for candidate in pending.snapshot() {
                let image = match self.dedup.store.load_image(&candidate) {
                    Ok(image) => image,
                    Err(e) => {
                        self.skip(&candidate, e.to_string());
                        pending.remove(&candidate);
                        survivors.push(candidate);
                        continue;
                    }
                };
                match self.dedup.metric.distance(&pivot_image, &image) {
                    Ok(distance) if self.dedup.metric.is_near_duplicate(distance) => {
                        pending.remove(&candidate);
                        self.remove_duplicate(candidate, &pivot, distance);
                    }
                    Ok(_) => {}
                    Err(e) => self.not_comparable(&pivot, &candidate, &e),
                }
            }

            survivors.push(pivot);
            if report_progress {
                self.progress(pending.len());
            }
        }

        survivors.extend(pending.into_vec());
        if report_progress && !token.is_cancelled() {
            self.progress(0);
        }
        survivors
    }

    fn remove_duplicate(&mut self, id: SampleId, pivot: &SampleId, distance: f64) {
        match self.dedup.store.delete(&id) {
            Ok(()) => {
                debug!(%id, %pivot, distance, "deleted near-duplicate");
                self.dedup.events.send(Event::Dedup(DedupEvent::Deleted {
                    id: id.clone(),
                    distance,
                }));
                self.outcome.deleted.push(id);
            }
            Err(e) => {
                warn!(%id, error = %e, "failed to delete near-duplicate; left in place");
                self.outcome.failures.push(format!("{id}: {e}"));
            }
        }
    }

    /// Report an unreadable sample once per pass
    fn skip(&mut self, id: &SampleId, reason: String) {
        if !self.skipped.insert(id.clone()) {
            return;
        }
        warn!(%id, %reason, "skipping unreadable sample");
        self.outcome.failures.push(format!("{id}: {reason}"));
        self.dedup.events.send(Event::Dedup(DedupEvent::Skipped {
            id: id.clone(),
            reason,
        }));
    }

    /// Both samples stay; the pair is simply never compared
    fn not_comparable(&self, pivot: &SampleId, candidate: &SampleId, error: &MetricError) {
        warn!(%pivot, %candidate, %error, "samples not comparable");
        self.dedup.events.put_line(format!(
            "{} is not same size as {}: {error}",
            pivot.base_name(),
            candidate.base_name()
        ));
    }

    fn progress(&mut self, outstanding: usize) {
        let settled = self.total.saturating_sub(outstanding);
        if let Some(value) = self.throttle.update(percent(settled, self.total)) {
            self.dedup.events.send(Event::Dedup(DedupEvent::Progress { percent: value }));
        }
    }
}
