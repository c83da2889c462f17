//! In-memory sample store for testing.

use super::{SampleId, SampleStore};
use crate::error::StoreError;
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Mutex, RwLock};

const NEW_PREFIX: &str = "new/";
const PERSISTENT_PREFIX: &str = "persistent/";

/// A call made against an [`InMemorySampleStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Load(SampleId),
    Save(SampleId),
    Delete(SampleId),
    Promote(SampleId),
}

enum Slot {
    Image(RgbaImage),
    Corrupt,
}

/// In-memory sample store
///
/// Samples in the new area are keyed `new/<name>`, persistent ones
/// `persistent/<name>`. Every call is recorded so tests can assert on
/// exactly what a curation run did.
#[derive(Default)]
pub struct InMemorySampleStore {
    samples: RwLock<HashMap<SampleId, Slot>>,
    failing: RwLock<HashSet<SampleId>>,
    calls: Mutex<Vec<StoreCall>>,
}

fn poisoned(id: &SampleId) -> StoreError {
    StoreError::Io {
        id: id.to_string(),
        source: io::Error::other("in-memory store lock poisoned"),
    }
}

impl InMemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample to the new area
    pub fn insert_new(&self, name: &str, image: RgbaImage) -> SampleId {
        self.insert(SampleId::new(format!("{NEW_PREFIX}{name}")), Slot::Image(image))
    }

    /// Add a sample to the persistent corpus
    pub fn insert_persistent(&self, name: &str, image: RgbaImage) -> SampleId {
        self.insert(SampleId::new(format!("{PERSISTENT_PREFIX}{name}")), Slot::Image(image))
    }

    /// Add an undecodable sample to the new area
    pub fn insert_corrupt_new(&self, name: &str) -> SampleId {
        self.insert(SampleId::new(format!("{NEW_PREFIX}{name}")), Slot::Corrupt)
    }

    /// Add an undecodable sample to the persistent corpus
    pub fn insert_corrupt_persistent(&self, name: &str) -> SampleId {
        self.insert(SampleId::new(format!("{PERSISTENT_PREFIX}{name}")), Slot::Corrupt)
    }

    /// Make delete, save and promote fail with an I/O error for `id`
    pub fn fail_writes_for(&self, id: &SampleId) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(id.clone());
        }
    }

    fn insert(&self, id: SampleId, slot: Slot) -> SampleId {
        if let Ok(mut samples) = self.samples.write() {
            samples.insert(id.clone(), slot);
        }
        id
    }

    fn record(&self, call: StoreCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn check_writable(&self, id: &SampleId) -> Result<(), StoreError> {
        let failing = self.failing.read().map_err(|_| poisoned(id))?;
        if failing.contains(id) {
            return Err(StoreError::Io {
                id: id.to_string(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "write refused"),
            });
        }
        Ok(())
    }

    fn list_prefixed(&self, prefix: &str) -> Vec<SampleId> {
        let Ok(samples) = self.samples.read() else {
            return Vec::new();
        };
        let mut ids: Vec<_> = samples
            .keys()
            .filter(|id| id.as_str().starts_with(prefix))
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Identifiers passed to `delete`
    pub fn deletes(&self) -> Vec<SampleId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Identifiers passed to `promote_to_persistent`
    pub fn promotions(&self) -> Vec<SampleId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                StoreCall::Promote(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Number of `load_image` calls
    pub fn load_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::Load(_)))
            .count()
    }

    /// Current content of a sample, without recording a load
    pub fn peek(&self, id: &SampleId) -> Option<RgbaImage> {
        let samples = self.samples.read().ok()?;
        match samples.get(id)? {
            Slot::Image(image) => Some(image.clone()),
            Slot::Corrupt => None,
        }
    }

    pub fn new_count(&self) -> usize {
        self.list_prefixed(NEW_PREFIX).len()
    }

    pub fn persistent_count(&self) -> usize {
        self.list_prefixed(PERSISTENT_PREFIX).len()
    }
}

impl SampleStore for InMemorySampleStore {
    fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
        self.record(StoreCall::Load(id.clone()));
        let samples = self.samples.read().map_err(|_| poisoned(id))?;
        match samples.get(id) {
            Some(Slot::Image(image)) => Ok(image.clone()),
            Some(Slot::Corrupt) => Err(StoreError::Decode {
                id: id.to_string(),
                reason: "corrupt sample".to_string(),
            }),
            None => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
        self.record(StoreCall::Save(id.clone()));
        self.check_writable(id)?;
        let mut samples = self.samples.write().map_err(|_| poisoned(id))?;
        samples.insert(id.clone(), Slot::Image(image.clone()));
        Ok(())
    }

    fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
        self.record(StoreCall::Delete(id.clone()));
        self.check_writable(id)?;
        let mut samples = self.samples.write().map_err(|_| poisoned(id))?;
        samples.remove(id);
        Ok(())
    }

    fn list_new(&self) -> Result<Vec<SampleId>, StoreError> {
        Ok(self.list_prefixed(NEW_PREFIX))
    }

    fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError> {
        Ok(self.list_prefixed(PERSISTENT_PREFIX))
    }

    fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError> {
        self.record(StoreCall::Promote(id.clone()));
        self.check_writable(id)?;
        let target = SampleId::new(format!("{PERSISTENT_PREFIX}{}", id.base_name()));
        let mut samples = self.samples.write().map_err(|_| poisoned(id))?;
        samples.insert(target.clone(), Slot::Image(image.clone()));
        Ok(target)
    }
}
