// A named collection of photos belonging to one device.

use std::collections::HashMap;
use std::sync::Arc;

use log::warn;

use crate::error::{PhotoFsError, Result};
use crate::photo::Photo;

/// Controls whether [`Album::for_each`] keeps visiting photos.
pub enum Continue {
    Yes,
    No,
}

/// A named bag of photos, keyed by file name.
///
/// Photos are only added while the owning [`crate::catalog::DeviceCatalog`]
/// is being loaded; once the catalog construction finishes the album is
/// shared (behind an `Arc`) and never mutated again.
#[derive(Debug)]
pub struct Album {
    name: String,
    photos: HashMap<String, Arc<Photo>>,
}

impl Album {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(PhotoFsError::InvalidArgument(
                "album name must not be empty".into(),
            ));
        }

        Ok(Self {
            name,
            photos: HashMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert `photo` under its file name. Overwrites and logs a warning on
    /// a duplicate key — devices are expected to guarantee uniqueness, but
    /// correctness here does not depend on it.
    pub fn add(&mut self, photo: Photo) {
        let key = photo.file_name().to_string();
        if self.photos.contains_key(&key) {
            warn!(
                "photo '{}' already present in album '{}', overwriting",
                key, self.name
            );
        }
        self.photos.insert(key, Arc::new(photo));
    }

    /// Invoke `callback` for each photo until it signals [`Continue::No`] or
    /// every photo has been visited. Iteration order is unspecified.
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(&Arc<Photo>) -> Continue,
    {
        for photo in self.photos.values() {
            if let Continue::No = callback(photo) {
                break;
            }
        }
    }

    pub fn get_by_file_name(&self, file_name: &str) -> Result<Arc<Photo>> {
        self.photos
            .get(file_name)
            .cloned()
            .ok_or_else(|| PhotoFsError::NotFound(format!("photo '{file_name}'")))
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }
}
