// src/store/mod.rs

//! Object store client
//!
//! Bucket/key operations used by the package lifecycle: prefix listing,
//! filtered download by prefix, tree upload and prefix deletion. Backends only
//! provide single-object primitives ([`ObjectBackend`]); walking, filtering and
//! progress accounting happen here.

pub mod filter;
pub mod memory;
pub mod s3;

use crate::error::{Error, Result};
use crate::progress::ProgressTracker;
use crate::transfer::Transfer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use filter::relative_key;

pub use filter::ExclusionFilter;
pub use memory::MemoryObjects;

/// Metadata of a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    /// Object key
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    /// Last modified time, when the store reports one
    pub last_modified: Option<DateTime<Utc>>,
}

/// Single-object primitives of an object store
pub trait ObjectBackend {
    /// Every object whose key starts with `prefix`
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Whole object body; a missing key is [`Error::NotFound`]
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Create or replace an object
    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object; deleting a missing key succeeds
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Builds a fresh object backend for one operation
pub trait ObjectConnector {
    fn connect(&self) -> Result<Box<dyn ObjectBackend>>;
}

impl<F> ObjectConnector for F
where
    F: Fn() -> Result<Box<dyn ObjectBackend>>,
{
    fn connect(&self) -> Result<Box<dyn ObjectBackend>> {
        self()
    }
}

/// Keys ending in `/` are folder markers, not content
fn is_folder_marker(key: &str) -> bool {
    key.ends_with('/')
}

/// Local path mirroring `key` below `root`, refusing keys that would escape it
fn mirrored_path(root: &Path, key: &str) -> Option<PathBuf> {
    let rel = Path::new(key.trim_start_matches('/'));
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| root.join(rel))
}

/// Object store client bound to one backend
pub struct ObjectStore {
    backend: Box<dyn ObjectBackend>,
}

impl ObjectStore {
    pub fn new(backend: Box<dyn ObjectBackend>) -> Self {
        Self { backend }
    }

    /// Objects under `prefix` (the whole bucket when `None`), sorted by key
    pub fn objects(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<ObjectInfo>> {
        let mut objects = self.backend.list(bucket, prefix.unwrap_or(""))?;
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    /// Keys under `prefix`, sorted
    pub fn list_objects(&self, bucket: &str, prefix: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .objects(bucket, prefix)?
            .into_iter()
            .map(|o| o.key)
            .collect())
    }

    /// Download every key under `prefix` that the filter keeps
    ///
    /// Each key is written to `local_dir/<key>`. Fails with
    /// [`Error::NoFilesDownloaded`] when no key survives filtering.
    pub fn download_prefix(
        &self,
        bucket: &str,
        prefix: &str,
        local_dir: &Path,
        filter: &ExclusionFilter,
        progress: &dyn ProgressTracker,
    ) -> Result<usize> {
        info!("S3 download s3://{}/{} -> {}", bucket, prefix, local_dir.display());
        let keys: Vec<String> = self
            .list_objects(bucket, Some(prefix))?
            .into_iter()
            .filter(|key| !is_folder_marker(key))
            .filter(|key| {
                let excluded = filter.is_excluded(relative_key(key, prefix));
                if excluded {
                    debug!("Excluding {}", key);
                }
                !excluded
            })
            .collect();

        if keys.is_empty() {
            return Err(Error::NoFilesDownloaded(format!("s3://{}/{}", bucket, prefix)));
        }

        let mut transfer = Transfer::start(progress, "S3 download", keys.len() as u64);
        for key in &keys {
            let Some(local) = mirrored_path(local_dir, key) else {
                warn!("Skipping key with unsafe path: {}", key);
                transfer.advance(key);
                continue;
            };
            debug!("Downloading {}", key);
            let data = self.backend.get(bucket, key)?;
            if let Some(parent) = local.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&local, data)?;
            transfer.advance(key);
        }
        let summary = transfer.complete();
        Ok(summary.units as usize)
    }

    /// Upload every regular file below `local_dir`
    ///
    /// Keys are `remote_subdir/<relative path>`, or the relative path alone.
    pub fn upload_tree(
        &self,
        bucket: &str,
        local_dir: &Path,
        remote_subdir: Option<&str>,
        progress: &dyn ProgressTracker,
    ) -> Result<usize> {
        info!("S3 upload {} -> s3://{}", local_dir.display(), bucket);
        let files: Vec<PathBuf> = WalkDir::new(local_dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::IoError(format!("walking {}: {}", local_dir.display(), e)))?
            .into_iter()
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();

        let subdir = remote_subdir.map(|s| s.trim_matches('/')).filter(|s| !s.is_empty());
        let mut transfer = Transfer::start(progress, "S3 upload", files.len() as u64);
        for path in &files {
            let rel = path
                .strip_prefix(local_dir)
                .map_err(|e| Error::IoError(e.to_string()))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let key = match subdir {
                Some(subdir) => format!("{}/{}", subdir, rel),
                None => rel,
            };
            debug!("Uploading {}", key);
            let data = std::fs::read(path)?;
            self.backend.put(bucket, &key, &data)?;
            transfer.advance(&key);
        }
        Ok(transfer.complete().units as usize)
    }

    /// Delete every key starting with `path`; returns the number deleted
    pub fn delete_prefix(&self, bucket: &str, path: &str) -> Result<usize> {
        let keys = self.list_objects(bucket, Some(path))?;
        for key in &keys {
            debug!("Deleting {}", key);
            self.backend.delete(bucket, key)?;
        }
        info!("Deleted {} objects under s3://{}/{}", keys.len(), bucket, path);
        Ok(keys.len())
    }

    /// True if at least one key starts with `path`
    pub fn exists_prefix(&self, bucket: &str, path: &str) -> Result<bool> {
        Ok(!self.backend.list(bucket, path)?.is_empty())
    }
}
