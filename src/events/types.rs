//! Event type definitions for progress reporting.

use crate::core::store::SampleId;
use serde::{Deserialize, Serialize};

/// All events emitted by a curation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Pipeline-level events
    Pipeline(PipelineEvent),
    /// New-sample deduplication events
    Dedup(DedupEvent),
    /// Persistent-store merge events
    Merge(MergeEvent),
    /// Free-form status line
    Notice { message: String },
}

/// Pipeline-level events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Pipeline has started
    Started {
        new_samples: usize,
        persistent_samples: usize,
    },
    /// Moving to a new phase
    PhaseChanged { phase: PipelinePhase },
    /// Pipeline ran to completion
    Completed { summary: CurationSummary },
    /// Pipeline stopped at a cancellation checkpoint
    Cancelled { summary: CurationSummary },
}

/// Phases of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelinePhase {
    Deduplicating,
    Merging,
}

/// Events from the new-sample deduplicator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DedupEvent {
    /// Deduplication started over `total` new samples
    Started { total: usize },
    /// Percentage of the original candidate set that has been settled
    Progress { percent: f64 },
    /// A near-duplicate was removed from the new area
    Deleted { id: SampleId, distance: f64 },
    /// A sample could not be compared and was left in place
    Skipped { id: SampleId, reason: String },
    /// Deduplication finished (or stopped)
    Completed { survivors: usize, deleted: usize },
}

/// Events from the persistent-store merger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MergeEvent {
    /// Merging started for `total` surviving samples
    Started { total: usize },
    /// Progress of the corpus search for one sample
    SearchProgress { id: SampleId, percent: f64 },
    /// The corpus already holds a near-duplicate; the new sample was dropped
    DuplicateFound { id: SampleId },
    /// The sample moved into the corpus
    Promoted { id: SampleId, target: SampleId },
    /// A per-sample operation failed; the sample was left in place
    Failed { id: SampleId, reason: String },
    /// Merging finished (or stopped)
    Completed { promoted: usize, discarded: usize },
}

/// Summary of one curation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationSummary {
    /// New samples found when the run started
    pub new_samples: usize,
    /// New samples removed as near-duplicates of other new samples
    pub duplicates_removed: usize,
    /// New samples removed because the corpus already had them
    pub redundant_with_corpus: usize,
    /// Samples moved into the corpus
    pub promoted: usize,
    /// Per-sample failures that were logged and skipped
    pub failures: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelinePhase::Deduplicating => write!(f, "Cleaning new samples"),
            PipelinePhase::Merging => write!(f, "Merging into corpus"),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Pipeline(event) => match event {
                PipelineEvent::Started {
                    new_samples,
                    persistent_samples,
                } => write!(
                    f,
                    "Curating {new_samples} new samples against {persistent_samples} in corpus"
                ),
                PipelineEvent::PhaseChanged { phase } => write!(f, "{phase}..."),
                PipelineEvent::Completed { summary } => write!(
                    f,
                    "Done: {} promoted, {} duplicates removed, {} already in corpus",
                    summary.promoted, summary.duplicates_removed, summary.redundant_with_corpus
                ),
                PipelineEvent::Cancelled { .. } => write!(f, "Cancelled"),
            },
            Event::Dedup(event) => match event {
                DedupEvent::Started { total } => write!(f, "Cleaning {total} new samples"),
                DedupEvent::Progress { percent } => write!(f, "Cleaning new samples... {percent:.3}%"),
                DedupEvent::Deleted { id, distance } => {
                    write!(f, "Delete {} :: {distance:.3}", id.base_name())
                }
                DedupEvent::Skipped { id, reason } => write!(f, "Skip {}: {reason}", id.base_name()),
                DedupEvent::Completed { survivors, deleted } => {
                    write!(f, "Cleaning done: {survivors} kept, {deleted} deleted")
                }
            },
            Event::Merge(event) => match event {
                MergeEvent::Started { total } => write!(f, "Merging {total} samples into corpus"),
                MergeEvent::SearchProgress { id, percent } => write!(
                    f,
                    "Find similar to {} in persistent storage... {percent:.3}%",
                    id.base_name()
                ),
                MergeEvent::DuplicateFound { id } => write!(
                    f,
                    "{} has similar image in persistent storage, delete it",
                    id.base_name()
                ),
                MergeEvent::Promoted { id, .. } => write!(f, "Move {}", id.base_name()),
                MergeEvent::Failed { id, reason } => write!(f, "FAIL: {}, {reason}", id.base_name()),
                MergeEvent::Completed { promoted, discarded } => {
                    write!(f, "Merge done: {promoted} moved, {discarded} discarded")
                }
            },
            Event::Notice { message } => f.write_str(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Dedup(DedupEvent::Deleted {
            id: SampleId::new("new/a.1.0.png"),
            distance: 3.5,
        });

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Dedup(DedupEvent::Deleted { id, distance }) => {
                assert_eq!(id.as_str(), "new/a.1.0.png");
                assert_eq!(distance, 3.5);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn progress_line_has_three_decimals() {
        let event = Event::Dedup(DedupEvent::Progress { percent: 12.5 });
        assert_eq!(event.to_string(), "Cleaning new samples... 12.500%");
    }

    #[test]
    fn lines_use_base_names() {
        let event = Event::Merge(MergeEvent::Promoted {
            id: SampleId::new("newmarkeddata/cap.3.1.png"),
            target: SampleId::new("markeddata/cap.3.1.png"),
        });
        assert_eq!(event.to_string(), "Move cap.3.1.png");
    }

    #[test]
    fn curation_summary_is_serializable() {
        let summary = CurationSummary {
            new_samples: 40,
            duplicates_removed: 12,
            redundant_with_corpus: 3,
            promoted: 25,
            failures: 0,
            duration_ms: 1500,
        };

        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"promoted\":25"));
    }
}
