//! JSON snapshot persistence for the durable collections
//!
//! Each logical collection (safe zones, exit events, offline alerts,
//! contacts, companion requests) is one JSON array file under the storage
//! directory. Writes replace the whole snapshot via a temp file + rename so
//! a crash mid-write never leaves a half-written collection behind.

use crate::domain::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    pub fn new<P: AsRef<Path>>(dir: P, file_name: &str) -> Self {
        Self { path: dir.as_ref().join(file_name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the collection; a missing file is an empty collection
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let items = serde_json::from_str(&content)?;
        Ok(items)
    }

    /// Persist the whole collection snapshot
    pub fn persist<T: Serialize>(&self, items: &[T]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string(items)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), items = %items.len(), "store_persisted");
        Ok(())
    }
}
