//! Filesystem-backed sample store.
//!
//! New samples live in one directory, the curated corpus in another. Files
//! are PNG; writes go to a temporary sibling that is renamed into place, so
//! an interrupted write never leaves a truncated sample behind.

use super::{SampleId, SampleName, SampleStore};
use crate::error::StoreError;
use image::{ImageError, ImageFormat, RgbaImage};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory name of the new-sample area used by the capture tool
pub const DEFAULT_NEW_DIR: &str = "newmarkeddata";

/// Directory name of the persistent corpus used by the capture tool
pub const DEFAULT_PERSISTENT_DIR: &str = "markeddata";

/// Sample store over two directories
#[derive(Debug, Clone)]
pub struct FsSampleStore {
    new_dir: PathBuf,
    persistent_dir: PathBuf,
}

impl FsSampleStore {
    pub fn new(new_dir: impl Into<PathBuf>, persistent_dir: impl Into<PathBuf>) -> Self {
        Self {
            new_dir: new_dir.into(),
            persistent_dir: persistent_dir.into(),
        }
    }

    pub fn new_dir(&self) -> &Path {
        &self.new_dir
    }

    pub fn persistent_dir(&self) -> &Path {
        &self.persistent_dir
    }

    /// Write a freshly labeled grid cell into the new area
    pub fn save_new_sample(&self, name: &SampleName, image: &RgbaImage) -> Result<SampleId, StoreError> {
        let id = SampleId::from_path(&self.new_dir.join(name.to_string()));
        self.save_image(&id, image)?;
        Ok(id)
    }

    fn list_dir(dir: &Path) -> Result<Vec<SampleId>, StoreError> {
        if !dir.exists() {
            debug!(dir = %dir.display(), "sample directory does not exist yet");
            return Ok(Vec::new());
        }
        if !dir.is_dir() {
            return Err(StoreError::List {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    ids.push(SampleId::from_path(entry.path()));
                }
                Ok(_) => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "skipping unreadable entry"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn write_png(path: &Path, image: &RgbaImage, id: &SampleId) -> Result<(), StoreError> {
        let io_error = |source: io::Error| StoreError::Io {
            id: id.to_string(),
            source,
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(io_error)?;

        let mut temp = NamedTempFile::new_in(parent).map_err(io_error)?;
        image
            .write_to(temp.as_file_mut(), ImageFormat::Png)
            .map_err(|e| match e {
                ImageError::IoError(source) => io_error(source),
                other => StoreError::Encode {
                    id: id.to_string(),
                    reason: other.to_string(),
                },
            })?;
        temp.persist(path).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}

impl SampleStore for FsSampleStore {
    fn load_image(&self, id: &SampleId) -> Result<RgbaImage, StoreError> {
        let image = image::open(id.as_str()).map_err(|e| match e {
            ImageError::IoError(source) if source.kind() == io::ErrorKind::NotFound => {
                StoreError::NotFound { id: id.to_string() }
            }
            ImageError::IoError(source) => StoreError::Io {
                id: id.to_string(),
                source,
            },
            other => StoreError::Decode {
                id: id.to_string(),
                reason: other.to_string(),
            },
        })?;
        Ok(image.to_rgba8())
    }

    fn save_image(&self, id: &SampleId, image: &RgbaImage) -> Result<(), StoreError> {
        Self::write_png(Path::new(id.as_str()), image, id)
    }

    fn delete(&self, id: &SampleId) -> Result<(), StoreError> {
        match fs::remove_file(id.as_str()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                id: id.to_string(),
                source,
            }),
        }
    }

    fn list_new(&self) -> Result<Vec<SampleId>, StoreError> {
        Self::list_dir(&self.new_dir)
    }

    fn list_persistent(&self) -> Result<Vec<SampleId>, StoreError> {
        Self::list_dir(&self.persistent_dir)
    }

    fn promote_to_persistent(&self, id: &SampleId, image: &RgbaImage) -> Result<SampleId, StoreError> {
        let target = self.persistent_dir.join(id.base_name());
        let target_id = SampleId::from_path(&target);
        Self::write_png(&target, image, &target_id)?;
        Ok(target_id)
    }
}
