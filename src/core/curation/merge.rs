//! Merging deduplicated new samples into the persistent corpus.
//!
//! Each survivor is compared against the whole corpus on a worker pool. The
//! first near-duplicate ends the search and the new sample is dropped;
//! otherwise it is promoted and joins the corpus, so later survivors are also
//! checked against it.

use super::CandidateSet;
use crate::core::pipeline::CancellationToken;
use crate::core::pool::WorkerPool;
use crate::core::similarity::SimilarityMetric;
use crate::core::store::{SampleId, SampleStore};
use crate::error::{CurationError, PoolError};
use crate::events::{null_sender, percent, Event, EventSender, IntervalThrottle, MergeEvent};
use image::RgbaImage;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one merge pass
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Persistent identifiers of promoted samples
    pub promoted: Vec<SampleId>,
    /// New samples dropped because the corpus already held a near-duplicate
    pub discarded: Vec<SampleId>,
    /// Per-sample failures, already logged
    pub failures: Vec<String>,
    /// Stopped at a cancellation checkpoint
    pub cancelled: bool,
}

struct CompareJob {
    origin: Arc<RgbaImage>,
    candidate: RgbaImage,
}

enum Search {
    Found,
    NotFound,
    Cancelled,
}

/// Moves surviving new samples into the persistent corpus
pub struct Merger {
    store: Arc<dyn SampleStore>,
    metric: Arc<SimilarityMetric>,
    workers: usize,
    events: EventSender,
}

impl Merger {
    pub fn new(store: Arc<dyn SampleStore>, metric: Arc<SimilarityMetric>, workers: usize) -> Self {
        Self {
            store,
            metric,
            workers: workers.max(1),
            events: null_sender(),
        }
    }

    /// Report progress and decisions on `events`
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = events;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Merge `survivors` into the corpus.
    ///
    /// Fails only when the corpus cannot be listed or the pool cannot be
    /// started; per-sample problems are logged and the sample left in place.
    pub fn run(&self, survivors: CandidateSet, token: &CancellationToken) -> Result<MergeOutcome, CurationError> {
        let mut outcome = MergeOutcome::default();
        let total = survivors.len();
        self.events.send(Event::Merge(MergeEvent::Started { total }));

        if token.is_cancelled() {
            outcome.cancelled = true;
            self.finish(&outcome);
            return Ok(outcome);
        }

        let mut corpus = self.store.list_persistent()?;
        info!(total, corpus = corpus.len(), workers = self.workers, "merging into persistent corpus");

        let metric = Arc::clone(&self.metric);
        let mut pool = WorkerPool::spawn("corpus-search", self.workers, move |job: CompareJob| {
            metric
                .distance(&job.origin, &job.candidate)
                .map(|distance| metric.is_near_duplicate(distance))
                .unwrap_or(false)
        })?;

        let mut pending = survivors;
        while !pending.is_empty() {
            if token.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let Some(id) = pending.pop_any() else {
                break;
            };

            let image = match self.store.load_image(&id) {
                Ok(image) => image,
                Err(e) => {
                    self.fail(&mut outcome, &id, e.to_string());
                    continue;
                }
            };
            let origin = Arc::new(image);

            match self.search_corpus(&mut pool, &id, &origin, &corpus, token)? {
                Search::Found => self.discard(&mut outcome, id),
                Search::NotFound => {
                    if let Some(target) = self.promote(&mut outcome, id, &origin) {
                        corpus.push(target);
                    }
                }
                Search::Cancelled => {
                    outcome.cancelled = true;
                    break;
                }
            }
        }

        pool.shutdown();
        self.finish(&outcome);
        Ok(outcome)
    }

    fn search_corpus(
        &self,
        pool: &mut WorkerPool<CompareJob, bool>,
        id: &SampleId,
        origin: &Arc<RgbaImage>,
        corpus: &[SampleId],
        token: &CancellationToken,
    ) -> Result<Search, PoolError> {
        let mut throttle = IntervalThrottle::per_second();
        let mut found = false;

        for (index, corpus_id) in corpus.iter().enumerate() {
            if token.is_cancelled() {
                pool.drain();
                return Ok(Search::Cancelled);
            }

            let candidate = match self.store.load_image(corpus_id) {
                Ok(image) => image,
                Err(e) => {
                    warn!(%corpus_id, error = %e, "skipping unreadable corpus sample");
                    self.events
                        .put_line(format!("Skip corpus sample {}: {e}", corpus_id.base_name()));
                    continue;
                }
            };
            if let Err(e) = SimilarityMetric::check_dimensions(origin, &candidate) {
                warn!(%id, %corpus_id, error = %e, "corpus sample not comparable");
                self.events.put_line(format!(
                    "{} is not same size as {}: {e}",
                    id.base_name(),
                    corpus_id.base_name()
                ));
                continue;
            }

            let results = pool.submit(CompareJob {
                origin: Arc::clone(origin),
                candidate,
            })?;
            if results.into_iter().any(|matched| matched) {
                found = true;
                break;
            }

            if throttle.ready() {
                self.search_progress(id, index + 1, corpus.len());
            }
        }

        while !found {
            match pool.recv() {
                Some(matched) => found = matched,
                None => break,
            }
        }
        pool.drain();

        self.search_progress(id, corpus.len(), corpus.len());
        Ok(if found { Search::Found } else { Search::NotFound })
    }

    fn search_progress(&self, id: &SampleId, searched: usize, total: usize) {
        self.events.send(Event::Merge(MergeEvent::SearchProgress {
            id: id.clone(),
            percent: percent(searched, total),
        }));
    }

    fn discard(&self, outcome: &mut MergeOutcome, id: SampleId) {
        match self.store.delete(&id) {
            Ok(()) => {
                debug!(%id, "corpus already holds a near-duplicate; dropped");
                self.events.send(Event::Merge(MergeEvent::DuplicateFound { id: id.clone() }));
                outcome.discarded.push(id);
            }
            Err(e) => self.fail(outcome, &id, e.to_string()),
        }
    }

    /// Write the persistent copy first; the original is only removed once
    /// that succeeded.
    fn promote(&self, outcome: &mut MergeOutcome, id: SampleId, image: &RgbaImage) -> Option<SampleId> {
        let target = match self.store.promote_to_persistent(&id, image) {
            Ok(target) => target,
            Err(e) => {
                self.fail(outcome, &id, e.to_string());
                return None;
            }
        };

        if let Err(e) = self.store.delete(&id) {
            self.fail(outcome, &id, format!("promoted to {target} but original kept: {e}"));
        } else {
            debug!(%id, %target, "promoted");
            self.events.send(Event::Merge(MergeEvent::Promoted {
                id,
                target: target.clone(),
            }));
        }
        outcome.promoted.push(target.clone());
        Some(target)
    }

    fn fail(&self, outcome: &mut MergeOutcome, id: &SampleId, reason: String) {
        warn!(%id, %reason, "merge failed; sample left in place");
        outcome.failures.push(format!("{id}: {reason}"));
        self.events.send(Event::Merge(MergeEvent::Failed {
            id: id.clone(),
            reason,
        }));
    }

    fn finish(&self, outcome: &MergeOutcome) {
        info!(
            promoted = outcome.promoted.len(),
            discarded = outcome.discarded.len(),
            failures = outcome.failures.len(),
            cancelled = outcome.cancelled,
            "merge finished"
        );
        self.events.send(Event::Merge(MergeEvent::Completed {
            promoted: outcome.promoted.len(),
            discarded: outcome.discarded.len(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{InMemorySampleStore, StoreCall};
    use crate::error::StoreError;
    use crate::events::{EventChannel, EventReceiver};
    use image::Rgba;
    use std::thread;
    use std::time::Duration;

    /// Cancels `token` as soon as `trigger` is loaded
    struct CancelOnLoad {
        inner: Arc<InMemorySampleStore>,
        trigger: SampleId,
        token: CancellationToken,
    }

    impl SampleStore for CancelOnLoad {
        fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
            if *id == self.trigger {
                self.token.cancel();
            }
            self.inner.load_image(id)
        }

        fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
            self.inner.save_image(id, image)
        }

        fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
            self.inner.delete(id)
        }

        fn list_new(&self) -> Result<Vec<SampleId>, StoreError> {
            self.inner.list_new()
        }

        fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError> {
            self.inner.list_persistent()
        }

        fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError> {
            self.inner.promote_to_persistent(id, image)
        }
    }

    /// Corpus of 20 dark samples, none close to a bright survivor
    fn dark_corpus(store: &InMemorySampleStore) -> Vec<SampleId> {
        for index in 0..20u8 {
            store.insert_persistent(&format!("p.{index:02}.0.png"), gray(index * 5));
        }
        store.list_persistent().unwrap()
    }

    fn notices(receiver: &EventReceiver) -> Vec<String> {
        receiver
            .drain()
            .into_iter()
            .filter_map(|event| match event {
                Event::Notice { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn gray(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([value, value, value, 255]))
    }

    fn pattern(seed: u8) -> RgbaImage {
        RgbaImage::from_fn(4, 4, |x, y| {
            Rgba([seed.wrapping_add(x as u8 * 60), seed ^ (y as u8 * 70), (x * y) as u8, 255 - seed])
        })
    }

    fn merger(store: &Arc<InMemorySampleStore>) -> Merger {
        let store: Arc<dyn SampleStore> = store.clone();
        Merger::new(store, Arc::new(SimilarityMetric::new()), 2)
    }

    fn survivors(store: &InMemorySampleStore) -> CandidateSet {
        store.list_new().unwrap().into_iter().collect()
    }

    #[test]
    fn duplicate_of_corpus_sample_is_dropped() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_persistent("p.0.1.png", gray(100));
        let new = store.insert_new("s.0.1.png", gray(102));

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.discarded, vec![new.clone()]);
        assert!(store.promotions().is_empty());
        assert_eq!(store.deletes(), vec![new]);
        assert_eq!(store.persistent_count(), 1);
    }

    #[test]
    fn novel_sample_is_promoted_bit_exact() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_persistent("p.0.1.png", gray(100));
        let image = pattern(7);
        let new = store.insert_new("s.3.0.png", image.clone());

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.promoted.len(), 1);
        let target = &outcome.promoted[0];
        assert_eq!(target.as_str(), "persistent/s.3.0.png");
        assert_eq!(store.peek(target), Some(image));
        assert_eq!(store.peek(&new), None);
        assert_eq!(store.new_count(), 0);
    }

    #[test]
    fn promotion_happens_before_original_is_deleted() {
        let store = Arc::new(InMemorySampleStore::new());
        let new = store.insert_new("s.0.1.png", gray(10));

        merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        let writes: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|call| !matches!(call, StoreCall::Load(_)))
            .collect();
        assert_eq!(writes, vec![StoreCall::Promote(new.clone()), StoreCall::Delete(new)]);
    }

    #[test]
    fn promoted_sample_joins_corpus_for_later_survivors() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_new("a.0.1.png", gray(50));
        store.insert_new("b.0.1.png", gray(52));

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.promoted.len(), 1);
        assert_eq!(outcome.discarded.len(), 1);
        assert_eq!(store.persistent_count(), 1);
        assert_eq!(store.new_count(), 0);
    }

    #[test]
    fn mismatched_corpus_samples_are_ignored() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_persistent("wide.0.1.png", RgbaImage::from_pixel(8, 2, Rgba([30, 30, 30, 255])));
        store.insert_new("s.0.1.png", gray(30));
        let (sender, receiver) = EventChannel::new();

        let outcome = merger(&store)
            .with_events(sender)
            .run(survivors(&store), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.promoted.len(), 1);
        assert!(outcome.discarded.is_empty());
        assert_eq!(
            notices(&receiver),
            vec!["s.0.1.png is not same size as wide.0.1.png: Image dimensions differ: 4x4 vs 8x2".to_string()]
        );
    }

    #[test]
    fn unreadable_corpus_sample_is_reported_and_skipped() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_corrupt_persistent("bad.0.1.png");
        store.insert_persistent("p.0.1.png", gray(100));
        let new = store.insert_new("s.0.1.png", gray(101));
        let (sender, receiver) = EventChannel::new();

        let outcome = merger(&store)
            .with_events(sender)
            .run(survivors(&store), &CancellationToken::new())
            .unwrap();

        assert_eq!(outcome.discarded, vec![new]);
        let lines = notices(&receiver);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("Skip corpus sample bad.0.1.png"), "{}", lines[0]);
        assert_eq!(store.persistent_count(), 2);
    }

    #[test]
    fn search_cancelled_mid_corpus_drains_pool() {
        let inner = Arc::new(InMemorySampleStore::new());
        let corpus = dark_corpus(&inner);
        let token = CancellationToken::new();
        let store = CancelOnLoad {
            inner: Arc::clone(&inner),
            trigger: corpus[5].clone(),
            token: token.clone(),
        };
        let merger = Merger::new(Arc::new(store), Arc::new(SimilarityMetric::new()), 2);
        let mut pool = WorkerPool::spawn("search-test", 2, |_job: CompareJob| {
            thread::sleep(Duration::from_millis(25));
            false
        })
        .unwrap();
        let id = SampleId::new("new/s.0.1.png");
        let origin = Arc::new(gray(250));

        let search = merger.search_corpus(&mut pool, &id, &origin, &corpus, &token).unwrap();

        assert!(matches!(search, Search::Cancelled));
        assert_eq!(pool.in_flight(), 0);
        // Stopped right after the sample that triggered cancellation
        assert_eq!(inner.load_count(), 6);
        pool.shutdown();
    }

    #[test]
    fn cancelled_during_search_leaves_survivor_in_place() {
        let inner = Arc::new(InMemorySampleStore::new());
        let corpus = dark_corpus(&inner);
        let new = inner.insert_new("s.0.1.png", gray(250));
        let token = CancellationToken::new();
        let store = CancelOnLoad {
            inner: Arc::clone(&inner),
            trigger: corpus[10].clone(),
            token: token.clone(),
        };
        let merger = Merger::new(Arc::new(store), Arc::new(SimilarityMetric::new()), 3);

        let outcome = merger.run(survivors(&inner), &token).unwrap();

        assert!(outcome.cancelled);
        assert!(outcome.promoted.is_empty());
        assert!(outcome.discarded.is_empty());
        assert!(inner.promotions().is_empty());
        assert!(inner.deletes().is_empty());
        assert_eq!(inner.peek(&new), Some(gray(250)));
        assert_eq!(inner.persistent_count(), 20);
    }

    #[test]
    fn failed_promotion_leaves_original_in_place() {
        let store = Arc::new(InMemorySampleStore::new());
        let new = store.insert_new("s.0.1.png", gray(10));
        store.fail_writes_for(&new);

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert!(outcome.promoted.is_empty());
        assert_eq!(outcome.failures.len(), 1);
        assert!(store.deletes().is_empty());
        assert_eq!(store.peek(&new), Some(gray(10)));
    }

    #[test]
    fn unreadable_survivor_is_reported_and_kept() {
        let store = Arc::new(InMemorySampleStore::new());
        let corrupt = store.insert_corrupt_new("bad.0.1.png");

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].contains(corrupt.as_str()));
        assert_eq!(store.new_count(), 1);
    }

    #[test]
    fn cancelled_merge_touches_nothing() {
        let store = Arc::new(InMemorySampleStore::new());
        store.insert_persistent("p.0.1.png", gray(100));
        store.insert_new("s.0.1.png", gray(10));
        let token = CancellationToken::new();
        token.cancel();

        let outcome = merger(&store).run(survivors(&store), &token).unwrap();

        assert!(outcome.cancelled);
        assert!(store.calls().is_empty());
    }

    #[test]
    fn large_corpus_search_finds_late_match() {
        let store = Arc::new(InMemorySampleStore::new());
        for index in 0..20u8 {
            store.insert_persistent(&format!("p.{index}.0.png"), gray(index * 12));
        }
        // Closest corpus sample is p.19 (228)
        store.insert_new("s.0.0.png", gray(231));

        let outcome = merger(&store).run(survivors(&store), &CancellationToken::new()).unwrap();

        assert_eq!(outcome.discarded.len(), 1);
        assert!(outcome.promoted.is_empty());
    }
}
