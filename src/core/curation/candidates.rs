//! Working set of samples awaiting a dedup decision.

use crate::core::store::SampleId;
use std::collections::HashSet;

/// Unordered, duplicate-free set of sample identifiers.
///
/// `pop_any` and `take_batch` hand out arbitrary members. Callers must not
/// depend on which member comes out.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    members: HashSet<SampleId>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &SampleId) -> bool {
        self.members.contains(id)
    }

    /// Returns false if `id` was already a member
    pub fn insert(&mut self, id: SampleId) -> bool {
        self.members.insert(id)
    }

    /// Returns false if `id` was not a member
    pub fn remove(&mut self, id: &SampleId) -> bool {
        self.members.remove(id)
    }

    /// Remove and return some member
    pub fn pop_any(&mut self) -> Option<SampleId> {
        let id = self.members.iter().next().cloned()?;
        self.members.remove(&id);
        Some(id)
    }

    /// Remove and return up to `size` members
    pub fn take_batch(&mut self, size: usize) -> Vec<SampleId> {
        let batch: Vec<SampleId> = self.members.iter().take(size).cloned().collect();
        for id in &batch {
            self.members.remove(id);
        }
        batch
    }

    /// Copy of the current members
    pub fn snapshot(&self) -> Vec<SampleId> {
        self.members.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SampleId> {
        self.members.iter()
    }

    pub fn into_vec(self) -> Vec<SampleId> {
        self.members.into_iter().collect()
    }
}

impl FromIterator<SampleId> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = SampleId>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().collect(),
        }
    }
}

impl Extend<SampleId> for CandidateSet {
    fn extend<I: IntoIterator<Item = SampleId>>(&mut self, iter: I) {
        self.members.extend(iter);
    }
}
