// src/store/memory.rs

//! In-memory object backend
//!
//! Buckets spring into existence on first write and listing an unknown bucket
//! is empty. Clones share storage.

use super::{ObjectBackend, ObjectInfo};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Objects = BTreeMap<(String, String), (Vec<u8>, DateTime<Utc>)>;

/// Shared in-memory buckets
#[derive(Debug, Clone, Default)]
pub struct MemoryObjects {
    objects: Arc<Mutex<Objects>>,
}

impl MemoryObjects {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Objects> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store an object directly
    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.lock()
            .insert((bucket.to_string(), key.to_string()), (data.to_vec(), Utc::now()));
    }

    /// Body of an object, if present
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|(data, _)| data.clone())
    }

    /// All keys of a bucket, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }
}

impl ObjectBackend for MemoryObjects {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .lock()
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|((_, key), (data, modified))| ObjectInfo {
                key: key.clone(),
                size: data.len() as u64,
                last_modified: Some(*modified),
            })
            .collect())
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.object(bucket, key)
            .ok_or_else(|| Error::NotFound(format!("s3://{}/{}", bucket, key)))
    }

    fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.insert(bucket, key, data);
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.lock().remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_is_not_found() {
        let objects = MemoryObjects::new();
        assert!(objects.get("b", "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_clones_share_state() {
        let objects = MemoryObjects::new();
        let other = objects.clone();
        other.put("b", "k", b"v").unwrap();
        assert_eq!(objects.object("b", "k").unwrap(), b"v");
        objects.delete("b", "k").unwrap();
        assert!(other.keys("b").is_empty());
    }
}
