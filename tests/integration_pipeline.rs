//! Integration tests for the pipeline module.
//!
//! These tests run the full pipeline over real PNG files:
//! - Empty and missing directories
//! - Dedup and merge decisions end to end
//! - Corrupt files and mismatched dimensions
//! - Cancellation

use image::{Rgba, RgbaImage};
use sample_curation::config::CurationConfig;
use sample_curation::core::pipeline::{CancellationToken, CurationPipeline, PipelineState};
use sample_curation::core::store::{FsSampleStore, Label, SampleId, SampleName, SampleStore};
use sample_curation::error::StoreError;
use sample_curation::events::EventChannel;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn gray(value: u8) -> RgbaImage {
    RgbaImage::from_pixel(6, 6, Rgba([value, value, value, 255]))
}

fn pattern(seed: u8) -> RgbaImage {
    RgbaImage::from_fn(6, 6, |x, y| {
        Rgba([seed.wrapping_add((x * 40) as u8), (y * 40) as u8, seed ^ (x + y) as u8, 255])
    })
}

fn config_in(dir: &TempDir) -> CurationConfig {
    CurationConfig {
        new_dir: dir.path().join("newmarkeddata"),
        persistent_dir: dir.path().join("markeddata"),
        dedup_workers: Some(2),
        search_workers: Some(3),
        ..Default::default()
    }
}

fn save_new(store: &FsSampleStore, base: &str, image: &RgbaImage) -> SampleId {
    store
        .save_new_sample(&SampleName::new(base, 0, Label::Positive), image)
        .unwrap()
}

fn save_persistent(store: &FsSampleStore, name: &str, image: &RgbaImage) -> SampleId {
    let id = SampleId::from_path(&store.persistent_dir().join(name));
    store.save_image(&id, image).unwrap();
    id
}

fn files_in(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|entry| entry.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn pipeline_handles_missing_directories() {
    let dir = TempDir::new().unwrap();
    let pipeline = CurationPipeline::from_config(&config_in(&dir)).unwrap();

    let report = pipeline.run(&CancellationToken::new()).unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.summary.new_samples, 0);
    assert!(report.failures.is_empty());
}

#[test]
fn pipeline_curates_new_samples_into_corpus() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();

    // A cluster of three near-duplicates
    save_new(&store, "cluster-a", &gray(100));
    save_new(&store, "cluster-b", &gray(102));
    save_new(&store, "cluster-c", &gray(104));
    // A novel sample
    let novel = pattern(9);
    save_new(&store, "novel", &novel);
    // A sample the corpus already covers
    save_new(&store, "covered", &gray(200));
    save_persistent(&store, "existing.0.1.png", &gray(201));

    let report = CurationPipeline::from_config(&config)
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.summary.new_samples, 5);
    assert_eq!(report.summary.duplicates_removed, 2);
    assert_eq!(report.summary.redundant_with_corpus, 1);
    assert_eq!(report.summary.promoted, 2);

    assert!(store.list_new().unwrap().is_empty());
    assert_eq!(store.list_persistent().unwrap().len(), 3);

    let promoted_novel = SampleId::from_path(&config.persistent_dir.join("novel.0.1.png"));
    assert_eq!(store.load_image(&promoted_novel).unwrap(), novel);
}

#[test]
fn pipeline_leaves_corrupt_files_in_place() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    save_new(&store, "good", &gray(50));
    fs::write(config.new_dir.join("broken.3.0.png"), b"this is not a valid image file").unwrap();

    let report = CurationPipeline::from_config(&config)
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.summary.promoted, 1);
    assert!(!report.failures.is_empty());
    assert!(config.new_dir.join("broken.3.0.png").exists());
}

#[test]
fn pipeline_never_merges_across_dimensions() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    save_persistent(&store, "square.0.1.png", &gray(80));
    save_new(&store, "wide", &RgbaImage::from_pixel(12, 3, Rgba([80, 80, 80, 255])));

    let report = CurationPipeline::from_config(&config)
        .unwrap()
        .run(&CancellationToken::new())
        .unwrap();

    assert_eq!(report.summary.promoted, 1);
    assert_eq!(report.summary.redundant_with_corpus, 0);
}

#[test]
fn cancelled_before_start_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    for index in 0..5u8 {
        save_new(&store, &format!("s{index}"), &gray(100 + index));
    }
    let token = CancellationToken::new();
    token.cancel();

    let pipeline = CurationPipeline::from_config(&config).unwrap();
    let report = pipeline.run(&token).unwrap();

    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(pipeline.state(), PipelineState::Cancelled);
    assert_eq!(store.list_new().unwrap().len(), 5);
    assert!(files_in(&config.persistent_dir).is_empty());
}

/// File store that cancels `token` on its first delete
struct CancelOnDelete {
    inner: FsSampleStore,
    token: CancellationToken,
}

impl SampleStore for CancelOnDelete {
    fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
        self.inner.load_image(id)
    }

    fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
        self.inner.save_image(id, image)
    }

    fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
        self.token.cancel();
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

#[test]
fn cancelling_mid_run_stops_at_next_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    for index in 0..24u8 {
        // Pairs of near-duplicates
        save_new(&store, &format!("s{index:02}"), &gray((index / 2) * 20));
    }

    let token = CancellationToken::new();
    let pipeline = CurationPipeline::builder()
        .config(&config)
        .store(CancelOnDelete {
            inner: config.store(),
            token: token.clone(),
        })
        .build();

    let report = pipeline.run(&token).unwrap();

    assert_eq!(report.state, PipelineState::Cancelled);
    assert_eq!(pipeline.state(), PipelineState::Cancelled);
    // Only the batch in progress when the first delete happened was applied
    let deleted = report.summary.duplicates_removed;
    assert!((1..=2).contains(&deleted), "{deleted} deleted");
    assert_eq!(report.summary.promoted, 0);
    assert!(files_in(&config.persistent_dir).is_empty());

    // Every file left behind decodes; no temporary siblings remain
    let left = files_in(&config.new_dir);
    assert_eq!(left.len(), 24 - deleted);
    for path in left {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(SampleName::parse(&name).is_some(), "unexpected file {name}");
        assert!(store.load_image(&SampleId::from_path(&path)).is_ok());
    }
}

#[test]
fn size_mismatches_are_reported_as_status_lines() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    save_new(&store, "square", &RgbaImage::from_pixel(4, 4, Rgba([60, 60, 60, 255])));
    save_new(&store, "tall", &RgbaImage::from_pixel(2, 8, Rgba([60, 60, 60, 255])));
    save_persistent(&store, "wide.0.1.png", &RgbaImage::from_pixel(8, 2, Rgba([60, 60, 60, 255])));

    let (sender, receiver) = EventChannel::new();
    let report = CurationPipeline::from_config(&config)
        .unwrap()
        .run_with_events(&CancellationToken::new(), &sender)
        .unwrap();
    drop(sender);

    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(report.summary.promoted, 2);
    let lines: Vec<String> = receiver.lines().collect();
    let notices: Vec<&String> = lines.iter().filter(|line| line.contains("is not same size as")).collect();
    // One within the new area, then the first survivor against the wide
    // sample and the second against both the wide sample and the first
    assert_eq!(notices.len(), 4, "{lines:#?}");
    assert!(notices.iter().any(|line| line.contains("wide.0.1.png")));
}

#[test]
fn diff_reports_distance_between_files() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let store = config.store();
    let a = save_new(&store, "a", &gray(10));
    let b = save_new(&store, "b", &gray(17));

    let distance = CurationPipeline::from_config(&config).unwrap().diff(&a, &b).unwrap();

    assert!((distance - 7.0).abs() < 1e-9);
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = CurationConfig {
        near_duplicate_threshold: -1.0,
        ..config_in(&dir)
    };

    assert!(CurationPipeline::from_config(&config).is_err());
}
