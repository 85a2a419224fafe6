//! Stored object descriptor.

use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};

use omnistore_common::{Error, Result};

use crate::path::object_name;
use crate::provider::{ByteStream, LocalFile, Storage};

/// One stored object, as reported by `put` or `list`.
///
/// Holds a weak handle to the backend that produced it, so it can fetch its
/// own content without keeping the backend alive. Once the backend is
/// dropped, fetches fail with [`Error::Detached`].
#[derive(Clone)]
pub struct Object {
    path: String,
    name: String,
    last_modified: Option<DateTime<Utc>>,
    size: u64,
    storage: Weak<dyn Storage>,
}

impl Object {
    /// Describe the object at canonical key `path`.
    pub fn new(path: impl Into<String>, storage: Weak<dyn Storage>) -> Self {
        let path = path.into();
        let name = object_name(&path).to_string();
        Self {
            path,
            name,
            last_modified: None,
            size: 0,
            storage,
        }
    }

    /// Set the byte length.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the modification time.
    pub fn with_last_modified(mut self, last_modified: Option<DateTime<Utc>>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Canonical key.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final segment of the key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Modification time, when the backend reports one.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Size in bytes; zero when unknown.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The owning backend, if it is still alive.
    pub fn storage(&self) -> Option<Arc<dyn Storage>> {
        self.storage.upgrade()
    }

    /// Fetch the content into a temporary file through the owning backend.
    pub async fn get(&self) -> Result<LocalFile> {
        self.backend()?.get(&self.path).await
    }

    /// Stream the content through the owning backend.
    pub async fn get_stream(&self) -> Result<ByteStream> {
        self.backend()?.get_stream(&self.path).await
    }

    fn backend(&self) -> Result<Arc<dyn Storage>> {
        self.storage.upgrade().ok_or_else(|| {
            Error::Detached(format!("Backend for {} has been dropped", self.path))
        })
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("last_modified", &self.last_modified)
            .field("size", &self.size)
            .field(
                "backend",
                &self.storage.upgrade().map(|s| s.name().to_string()),
            )
            .finish()
    }
}
