// A single photo entry within an album.

use crate::error::{PhotoFsError, Result};

/// An immutable (file name, relative location) pair describing one photo.
///
/// `location` is the directory holding the backing file, relative to the
/// owning device's root path; the absolute host path is
/// `root_path.join(location).join(file_name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    file_name: String,
    location: String,
}

impl Photo {
    pub fn new(file_name: impl Into<String>, location: impl Into<String>) -> Result<Self> {
        let file_name = file_name.into();
        let location = location.into();

        if file_name.is_empty() {
            return Err(PhotoFsError::InvalidArgument(
                "photo file name must not be empty".into(),
            ));
        }
        if location.is_empty() {
            return Err(PhotoFsError::InvalidArgument(
                "photo location must not be empty".into(),
            ));
        }

        Ok(Self {
            file_name,
            location,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}
