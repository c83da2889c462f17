//! Sample store trait definition.

use super::SampleId;
use crate::error::StoreError;
use image::RgbaImage;
use std::sync::Arc;

/// Storage for new (unmerged) and persistent (curated) samples
pub trait SampleStore: Send + Sync {
    /// Load and decode a sample as RGBA8
    fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError>;

    /// Write a sample under `id`, replacing any previous content
    fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError>;

    /// Remove a sample.
    ///
    /// Deleting an identifier that no longer exists succeeds, so an
    /// interrupted run can be resumed.
    fn delete(&self, id: &SampleId) -> Result<(), StoreError>;

    /// Identifiers of every sample in the new area
    fn list_new(&self) -> Result<Vec<SampleId>, StoreError>;

    /// Identifiers of every sample in the persistent corpus
    fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError>;

    /// Write `image` into the persistent area under the base name of `id`.
    ///
    /// Returns the identifier of the persistent copy. The original stays in
    /// place; callers delete it once promotion succeeded.
    fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError>;
}

macro_rules! forward_sample_store {
    ($wrapper:ident) => {
        impl<T: SampleStore + ?Sized> SampleStore for $wrapper<T> {
            fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
                (**self).load_image(id)
            }

            fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
                (**self).save_image(id, image)
            }

            fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
                (**self).delete(id)
            }

            fn list_new(&self) -> Result<Vec<SampleId>, StoreError> {
                (**self).list_new()
            }

            fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError> {
                (**self).list_persistent()
            }

            fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError> {
                (**self).promote_to_persistent(id, image)
            }
        }
    };
}

forward_sample_store!(Arc);
forward_sample_store!(Box);
