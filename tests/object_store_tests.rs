use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fmtc::object_store::transfer::{self, Download, TransferError, Upload};
use fmtc::object_store::{
    LocalClient, LocalStore, MemoryClient, MemoryStore, ObjectStore, ObjectStoreError,
    StorageClient, PLACEHOLDER_BLOB,
};

/// Counts bucket lookups so tests can tell whether the backend was reached.
struct CountingClient {
    inner: MemoryClient,
    calls: AtomicUsize,
}

impl CountingClient {
    fn new() -> Self {
        let inner = MemoryClient::new();
        inner.create_bucket("ligex");
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageClient for CountingClient {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.bucket(name).await
    }
}

// ============================================================================
// Stores
// ============================================================================

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new("ligex", dir.path());

    let data = Bytes::from("hello world");
    store.put("a/b/c.txt", data.clone()).await.unwrap();

    assert_eq!(store.get("a/b/c.txt").await.unwrap(), data);
    assert_eq!(store.size("a/b/c.txt").await.unwrap(), Some(11));
    assert!(dir.path().join("a/b/c.txt").is_file());
}

#[tokio::test]
async fn test_local_store_delete_missing_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new("ligex", dir.path());

    store.delete("nonexistent").await.unwrap();
    assert_eq!(store.size("nonexistent").await.unwrap(), None);
}

#[tokio::test]
async fn test_local_store_rejects_parent_segments() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new("ligex", dir.path());

    let result = store.put("../escape.txt", Bytes::from("x")).await;
    assert!(matches!(result, Err(ObjectStoreError::Backend(_))));
}

#[tokio::test]
async fn test_local_store_rejects_absolute_keys() {
    let dir = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let client = LocalClient::new(dir.path()).unwrap();
    client.create_bucket("ligex").unwrap();

    let target = outside.path().join("escaped.txt");
    let key = target.to_string_lossy().to_string();
    let err = transfer::upload(&client, Upload::new().string("owned"), "ligex", &key)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Store(ObjectStoreError::Backend(_))
    ));
    assert!(!target.exists());

    let err = transfer::download(&client, "ligex", &key, Download::new().string())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Store(ObjectStoreError::Backend(_))
    ));

    let store = LocalStore::new("ligex", dir.path().join("ligex"));
    for key in ["./a.txt", "a/./b.txt", "/etc/hostname"] {
        assert!(store.put(key, Bytes::from("x")).await.is_err(), "{key} accepted");
    }
}

#[tokio::test]
async fn test_local_store_get_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new("ligex", dir.path());

    assert!(matches!(
        store.get("missing").await,
        Err(ObjectStoreError::BlobNotFound(_))
    ));
}

#[tokio::test]
async fn test_local_store_list_by_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new("ligex", dir.path());

    for key in ["7/out.txt", "7/logs/run.log", "70/out.txt", "8/out.txt"] {
        store.put(key, Bytes::from("x")).await.unwrap();
    }

    let keys = store.list("7/").await.unwrap();
    assert_eq!(keys, vec!["7/logs/run.log".to_string(), "7/out.txt".to_string()]);
}

#[tokio::test]
async fn test_local_client_requires_existing_bucket() {
    let dir = tempfile::tempdir().unwrap();
    let client = LocalClient::new(dir.path()).unwrap();
    client.create_bucket("ligex").unwrap();

    assert_eq!(client.bucket("ligex").await.unwrap().bucket_name(), "ligex");
    assert!(matches!(
        client.bucket("ligexprj").await,
        Err(ObjectStoreError::BucketNotFound(_))
    ));
}

#[tokio::test]
async fn test_memory_placeholder_bucket() {
    let store = MemoryStore::new("ligex").with_placeholder();

    assert!(store.exists(PLACEHOLDER_BLOB).await.unwrap());
    assert_eq!(store.list("").await.unwrap(), vec![PLACEHOLDER_BLOB.to_string()]);
}

// ============================================================================
// Transfers
// ============================================================================

#[tokio::test]
async fn test_upload_then_download_string() {
    let client = CountingClient::new();

    transfer::upload(&client, Upload::new().string("hello"), "ligex", "a/b.txt")
        .await
        .unwrap();

    let data = transfer::download(&client, "ligex", "a/b.txt", Download::new().string())
        .await
        .unwrap();
    assert_eq!(data, Some(Bytes::from("hello")));
}

#[tokio::test]
async fn test_ambiguous_upload_never_reaches_backend() {
    let client = CountingClient::new();

    let both = Upload::new().string("hello").filename("/tmp/hello.txt");
    let err = transfer::upload(&client, both, "ligex", "a/b.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AmbiguousUploadMode));

    let err = transfer::upload(&client, Upload::new(), "ligex", "a/b.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AmbiguousUploadMode));

    let err = transfer::download(&client, "ligex", "a/b.txt", Download::new())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::AmbiguousDownloadMode));

    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_upload_from_file_and_stream() {
    let dir = tempfile::tempdir().unwrap();
    let client = CountingClient::new();

    let source = dir.path().join("protein.pdb");
    std::fs::write(&source, "ATOM").unwrap();
    transfer::upload(&client, Upload::new().filename(&source), "ligex", "7/protein.pdb")
        .await
        .unwrap();

    let reader = std::io::Cursor::new(b"streamed".to_vec());
    transfer::upload(&client, Upload::new().stream(reader), "ligex", "7/stream.txt")
        .await
        .unwrap();

    let bucket = client.bucket("ligex").await.unwrap();
    assert_eq!(bucket.get("7/protein.pdb").await.unwrap(), Bytes::from("ATOM"));
    assert_eq!(bucket.get("7/stream.txt").await.unwrap(), Bytes::from("streamed"));
}

#[tokio::test]
async fn test_download_to_file_and_stream() {
    let dir = tempfile::tempdir().unwrap();
    let client = CountingClient::new();
    transfer::upload(&client, Upload::new().string("result"), "ligex", "7/out.txt")
        .await
        .unwrap();

    let target = dir.path().join("out.txt");
    let none = transfer::download(&client, "ligex", "7/out.txt", Download::new().filename(&target))
        .await
        .unwrap();
    assert!(none.is_none());
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "result");

    let mut sink: Vec<u8> = Vec::new();
    transfer::download(&client, "ligex", "7/out.txt", Download::new().stream(&mut sink))
        .await
        .unwrap();
    assert_eq!(sink, b"result");
}

#[tokio::test]
async fn test_download_missing_blob_leaves_destination_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let client = CountingClient::new();

    let target = dir.path().join("never.txt");
    let err = transfer::download(&client, "ligex", "nope.txt", Download::new().filename(&target))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::BlobNotFound(ref p) if p == "nope.txt"));
    assert!(!target.exists());
}

#[tokio::test]
async fn test_transfer_to_missing_bucket() {
    let client = CountingClient::new();

    let err = transfer::upload(&client, Upload::new().string("x"), "nobucket", "a.txt")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransferError::Store(ObjectStoreError::BucketNotFound(_))
    ));
}

#[tokio::test]
async fn test_wipe_removes_only_prefix() {
    let client = CountingClient::new();
    for path in ["7/a.txt", "7/b/c.txt", "8/a.txt"] {
        transfer::upload(&client, Upload::new().string("x"), "ligex", path)
            .await
            .unwrap();
    }

    let removed = transfer::wipe(&client, "7/", "ligex").await.unwrap();
    assert_eq!(removed, 2);

    let bucket = client.bucket("ligex").await.unwrap();
    assert_eq!(bucket.list("").await.unwrap(), vec!["8/a.txt".to_string()]);

    // Nothing left under the prefix
    assert_eq!(transfer::wipe(&client, "7/", "ligex").await.unwrap(), 0);
}
