//! Store decorator that serves repeated loads from the bitmap cache.

use super::{SampleId, SampleStore};
use crate::core::cache::BoundedImageCache;
use crate::error::StoreError;
use image::RgbaImage;
use std::sync::Arc;
use tracing::trace;

/// Wraps a store so every load, save, delete and promotion keeps the shared
/// [`BoundedImageCache`] in step with the stored samples.
pub struct CachingStore<S> {
    inner: S,
    cache: Arc<BoundedImageCache>,
}

impl<S: SampleStore> CachingStore<S> {
    pub fn new(inner: S, cache: Arc<BoundedImageCache>) -> Self {
        Self { inner, cache }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The shared cache
    pub fn cache(&self) -> &Arc<BoundedImageCache> {
        &self.cache
    }
}

impl<S: SampleStore> SampleStore for CachingStore<S> {
    fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
        if let Some(image) = self.cache.get(id.as_str()) {
            trace!(%id, "cache hit");
            return Ok(image);
        }
        let image = self.inner.load_image(id)?;
        self.cache.put(id.as_str(), &image);
        Ok(image)
    }

    fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
        self.inner.save_image(id, image)?;
        self.cache.put(id.as_str(), image);
        Ok(())
    }

    fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
        self.cache.delete(id.as_str());
        self.inner.delete(id)
    }

    fn list_new(&self) -> Result<Vec<SampleId>, StoreError> {
        self.inner.list_new()
    }

    fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError> {
        self.inner.list_persistent()
    }

    fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError> {
        let target = self.inner.promote_to_persistent(id, image)?;
        self.cache.put(target.as_str(), image);
        Ok(target)
    }
}
