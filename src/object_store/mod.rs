mod gcs;
mod local;
mod memory;
pub mod transfer;

pub use gcs::{GcsClient, GcsStore};
pub use local::{LocalClient, LocalStore};
pub use memory::{MemoryClient, MemoryStore, PLACEHOLDER_BLOB};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Blob not found: {0}")]
    BlobNotFound(String),
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A single bucket. Keys are plain blob paths; nothing is cached locally,
/// every call is a round trip to the backend.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket_name(&self) -> &str;
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    /// Deleting a missing blob is not an error.
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;
    /// Size in bytes, `None` when the blob does not exist.
    async fn size(&self, key: &str) -> Result<Option<u64>, ObjectStoreError>;
    fn public_url(&self, key: &str) -> String;
    /// Keys of every blob whose path starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
    /// Delete all `keys`; the first failure aborts the batch.
    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError>;
}

/// Resolves buckets by name.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError>;
}
