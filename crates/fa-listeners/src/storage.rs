//! Versioned JSON files under the storage directory
//!
//! File format:
//! ```json
//! {
//!   "version": 1,
//!   "minor_version": 1,
//!   "key": "event_listeners",
//!   "data": { ... }
//! }
//! ```

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use crate::store::{StoreError, StoreResult};

/// Envelope written around every stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Bumped on incompatible layout changes; newer files are not read
    pub version: u32,
    /// Bumped when fields are only added
    pub minor_version: u32,
    /// Also the file name
    pub key: String,
    pub data: T,
}

/// A directory of [`StorageFile`]s, one per key
#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// `Ok(None)` when nothing has been saved under `key` yet
    pub async fn load<T>(
        &self,
        key: &str,
        version: u32,
        minor_version: u32,
    ) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let raw = match fs::read(self.file_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let file: StorageFile<T> = serde_json::from_slice(&raw)?;

        match (file.version.cmp(&version), file.minor_version > minor_version) {
            (Ordering::Greater, _) => {
                return Err(StoreError::UnsupportedVersion {
                    key: key.to_string(),
                    found: file.version,
                    supported: version,
                })
            }
            (Ordering::Equal, true) => warn!(
                key,
                found = file.minor_version,
                known = minor_version,
                "stored file is from a newer minor version, extra fields ignored"
            ),
            _ => {}
        }

        debug!(key, version = file.version, "storage file read");
        Ok(Some(file.data))
    }

    /// Replace the file for `file.key` without ever leaving it half written
    pub async fn save<T>(&self, file: &StorageFile<T>) -> StoreResult<()>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.dir).await?;

        let target = self.file_path(&file.key);
        let staging = target.with_extension("tmp");
        fs::write(&staging, serde_json::to_vec_pretty(file)?).await?;
        fs::rename(&staging, &target).await?;

        debug!(key = %file.key, version = file.version, "storage file written");
        Ok(())
    }
}
