use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectStore, ObjectStoreError, StorageClient};

/// Local filesystem storage for development: each bucket is a directory under `base_path`.
pub struct LocalClient {
    base_path: PathBuf,
}

impl LocalClient {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, std::io::Error> {
        let base_path = base_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Create the bucket directory if it does not exist yet.
    pub fn create_bucket(&self, name: &str) -> Result<(), std::io::Error> {
        std::fs::create_dir_all(self.base_path.join(name))
    }
}

#[async_trait]
impl StorageClient for LocalClient {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let path = self.base_path.join(name);
        if name.is_empty() || name.contains('/') || !path.is_dir() {
            return Err(ObjectStoreError::BucketNotFound(name.to_string()));
        }
        Ok(Arc::new(LocalStore::new(name, path)))
    }
}

/// One bucket directory. Blob paths map onto nested files.
pub struct LocalStore {
    bucket: String,
    base_path: PathBuf,
}

impl LocalStore {
    pub fn new<P: AsRef<Path>>(bucket: &str, base_path: P) -> Self {
        Self {
            bucket: bucket.to_string(),
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, ObjectStoreError> {
        // Only plain relative segments; absolute keys would replace the base path on join
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && key
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(ObjectStoreError::Backend(format!("Invalid blob path: {key}")));
        }
        Ok(self.base_path.join(relative))
    }

    fn collect(&self, dir: &Path, keys: &mut Vec<String>) -> Result<(), std::io::Error> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, keys)?;
            } else if let Ok(rel) = path.strip_prefix(&self.base_path) {
                let key: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Err(ObjectStoreError::BlobNotFound(key.to_string()));
        }
        let data = tokio::fs::read(&path).await?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key)?;
        if path.is_file() {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.object_path(key)?.is_file())
    }

    async fn size(&self, key: &str) -> Result<Option<u64>, ObjectStoreError> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(tokio::fs::metadata(&path).await?.len()))
    }

    fn public_url(&self, key: &str) -> String {
        format!("file://{}", self.base_path.join(key).display())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        self.collect(&self.base_path, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}
