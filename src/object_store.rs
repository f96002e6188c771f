//! Storage for decorated artifacts.
//!
//! Artifacts are addressed by a key that is allocated once per entity and
//! then overwritten in place, so public URLs handed out earlier stay valid.

use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Blob storage for decorated images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous object.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

    /// Public URL of the object stored under `key`.
    fn public_url(&self, key: &str) -> String;
}

/// Allocate a fresh artifact key: eight hex characters plus `.jpg`.
pub fn allocate_key() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}.jpg", &id[..8])
}

fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        && !key.starts_with('.');
    if ok {
        Ok(())
    } else {
        Err(MonitorError::ObjectStore(format!("invalid object key: {key:?}")))
    }
}

fn join_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}

/// Objects stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    /// Create a store rooted at `root`; public URLs are `public_base_url/key`.
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        validate_key(key)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| MonitorError::ObjectStore(format!("cannot create object dir: {e}")))?;

        let path = self.path_for(key);
        let tmp = self.root.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| MonitorError::ObjectStore(format!("cannot write {key}: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| MonitorError::ObjectStore(format!("cannot replace {key}: {e}")))?;

        debug!(key, content_type, len = bytes.len(), "stored object");
        Ok(key.to_owned())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

/// A stored object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object payload.
    pub bytes: Bytes,
    /// MIME type given at write time.
    pub content_type: String,
    /// How many times the key has been written.
    pub writes: u32,
}

/// Volatile object store.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    public_base_url: String,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            public_base_url: public_base_url.into(),
        }
    }

    /// Fetch a stored object.
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        validate_key(key)?;
        let mut objects = self.objects.write().await;
        let writes = objects.get(key).map_or(0, |o| o.writes) + 1;
        objects.insert(
            key.to_owned(),
            StoredObject {
                bytes,
                content_type: content_type.to_owned(),
                writes,
            },
        );
        Ok(key.to_owned())
    }

    fn public_url(&self, key: &str) -> String {
        join_url(&self.public_base_url, key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn allocated_keys_are_short_hex_jpgs() {
        let key = allocate_key();
        assert_eq!(key.len(), 12);
        assert!(key.ends_with(".jpg"));
        assert!(key[..8].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(allocate_key(), allocate_key());
    }

    #[test]
    fn key_validation() {
        assert!(validate_key("abcd1234.jpg").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("../etc/passwd").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("a/b.jpg").is_err());
    }

    #[test]
    fn public_url_joins_without_double_slash() {
        let store = FsObjectStore::new("/tmp/x", "https://cdn.example/thumbs/");
        assert_eq!(
            store.public_url("abcd1234.jpg"),
            "https://cdn.example/thumbs/abcd1234.jpg"
        );
    }

    #[tokio::test]
    async fn fs_put_overwrites_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsObjectStore::new(dir.path().join("objects"), "https://cdn.example");

        let key = store
            .put("abcd1234.jpg", Bytes::from_static(b"first"), "image/jpeg")
            .await
            .unwrap();
        assert_eq!(key, "abcd1234.jpg");
        store
            .put("abcd1234.jpg", Bytes::from_static(b"second"), "image/jpeg")
            .await
            .unwrap();

        let on_disk = std::fs::read(store.path_for("abcd1234.jpg")).unwrap();
        assert_eq!(on_disk, b"second");
        let entries = std::fs::read_dir(store.root()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn memory_put_counts_writes() {
        let store = MemoryObjectStore::default();
        assert!(store.is_empty().await);
        store
            .put("k.jpg", Bytes::from_static(b"a"), "image/jpeg")
            .await
            .unwrap();
        store
            .put("k.jpg", Bytes::from_static(b"b"), "image/jpeg")
            .await
            .unwrap();
        let object = store.get("k.jpg").await.unwrap();
        assert_eq!(object.writes, 2);
        assert_eq!(object.bytes.as_ref(), b"b");
        assert_eq!(object.content_type, "image/jpeg");
        assert_eq!(store.len().await, 1);
        assert_eq!(store.public_url("k.jpg"), "memory://objects/k.jpg");
    }
}
