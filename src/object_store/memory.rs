use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{ObjectStore, ObjectStoreError, StorageClient};

/// Name of the blob seeded into the stub default bucket so listings are non-empty.
pub const PLACEHOLDER_BLOB: &str = "foo-0.16.0.whl";

/// In-process stand-in for the storage service, used when no credentials exist (CI).
#[derive(Default)]
pub struct MemoryClient {
    buckets: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty bucket, returning the existing one if already present.
    pub fn create_bucket(&self, name: &str) -> Arc<MemoryStore> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            buckets
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MemoryStore::new(name))),
        )
    }

    /// Register a prepared bucket, replacing any bucket of the same name.
    pub fn insert_bucket(&self, store: MemoryStore) -> Arc<MemoryStore> {
        let store = Arc::new(store);
        self.buckets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(store.bucket.clone(), Arc::clone(&store));
        store
    }
}

#[async_trait]
impl StorageClient for MemoryClient {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        match buckets.get(name) {
            Some(store) => Ok(Arc::clone(store) as Arc<dyn ObjectStore>),
            None => Err(ObjectStoreError::BucketNotFound(name.to_string())),
        }
    }
}

pub struct MemoryStore {
    bucket: String,
    blobs: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seed the placeholder blob.
    pub fn with_placeholder(self) -> Self {
        self.blobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(PLACEHOLDER_BLOB.to_string(), Bytes::new());
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.blobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Bytes>> {
        self.blobs.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        self.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        self.read()
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::BlobNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        self.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.read().contains_key(key))
    }

    async fn size(&self, key: &str) -> Result<Option<u64>, ObjectStoreError> {
        Ok(self.read().get(key).map(|b| b.len() as u64))
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://{}/{key}", self.bucket)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(self
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError> {
        let mut blobs = self.write();
        for key in keys {
            blobs.remove(key);
        }
        Ok(())
    }
}
