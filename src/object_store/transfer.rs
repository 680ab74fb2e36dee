//! Whole-blob transfers between the process and a named bucket.
//!
//! Both directions accept exactly one of three modes (a local file path,
//! in-memory content, or an async stream). The mode is checked before any
//! bucket is resolved, so a malformed request never reaches the backend.

use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{ObjectStoreError, StorageClient};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("You must indicate exactly one type of object to upload: filename, string or stream")]
    AmbiguousUploadMode,
    #[error("You must indicate exactly one download destination: filename, string or stream")]
    AmbiguousDownloadMode,
    #[error("That blob does not exist: {0}")]
    BlobNotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(ObjectStoreError),
}

impl From<ObjectStoreError> for TransferError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::BlobNotFound(path) => TransferError::BlobNotFound(path),
            other => TransferError::Store(other),
        }
    }
}

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// What to upload. Build with the setters, then pass to [`upload`].
#[derive(Default)]
pub struct Upload {
    filename: Option<PathBuf>,
    string: Option<Bytes>,
    stream: Option<BoxReader>,
}

/// A validated upload source.
pub enum UploadSource {
    Filename(PathBuf),
    String(Bytes),
    Stream(BoxReader),
}

impl Upload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload the contents of a local file.
    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    /// Upload in-memory content.
    pub fn string(mut self, content: impl Into<Bytes>) -> Self {
        self.string = Some(content.into());
        self
    }

    /// Upload everything readable from `reader`.
    pub fn stream(mut self, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        self.stream = Some(Box::new(reader));
        self
    }

    pub fn into_source(self) -> Result<UploadSource, TransferError> {
        match (self.filename, self.string, self.stream) {
            (Some(path), None, None) => Ok(UploadSource::Filename(path)),
            (None, Some(content), None) => Ok(UploadSource::String(content)),
            (None, None, Some(reader)) => Ok(UploadSource::Stream(reader)),
            _ => Err(TransferError::AmbiguousUploadMode),
        }
    }
}

impl UploadSource {
    async fn into_bytes(self) -> Result<Bytes, std::io::Error> {
        match self {
            UploadSource::Filename(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
            UploadSource::String(content) => Ok(content),
            UploadSource::Stream(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

type BoxWriter<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Where a download goes. Build with the setters, then pass to [`download`].
#[derive(Default)]
pub struct Download<'a> {
    filename: Option<PathBuf>,
    string: bool,
    stream: Option<BoxWriter<'a>>,
}

enum Destination<'a> {
    Filename(PathBuf),
    String,
    Stream(BoxWriter<'a>),
}

impl<'a> Download<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the blob to a local file, replacing it.
    pub fn filename(mut self, path: impl Into<PathBuf>) -> Self {
        self.filename = Some(path.into());
        self
    }

    /// Return the blob contents from [`download`].
    pub fn string(mut self) -> Self {
        self.string = true;
        self
    }

    /// Copy the blob into `writer`.
    pub fn stream(mut self, writer: BoxWriter<'a>) -> Self {
        self.stream = Some(writer);
        self
    }

    fn into_destination(self) -> Result<Destination<'a>, TransferError> {
        match (self.filename, self.string, self.stream) {
            (Some(path), false, None) => Ok(Destination::Filename(path)),
            (None, true, None) => Ok(Destination::String),
            (None, false, Some(writer)) => Ok(Destination::Stream(writer)),
            _ => Err(TransferError::AmbiguousDownloadMode),
        }
    }
}

/// Upload `object` to `blob_path` in `bucket_name`, creating or replacing the blob.
pub async fn upload(
    client: &dyn StorageClient,
    object: Upload,
    bucket_name: &str,
    blob_path: &str,
) -> Result<(), TransferError> {
    let source = object.into_source()?;
    let bucket = client.bucket(bucket_name).await?;
    let data = source.into_bytes().await?;
    let size = data.len();

    if let Err(e) = bucket.put(blob_path, data).await {
        tracing::error!(bucket = bucket_name, blob = blob_path, error = %e, "Upload failed");
        return Err(e.into());
    }

    tracing::debug!(bucket = bucket_name, blob = blob_path, size, "Uploaded blob");
    Ok(())
}

/// Download `blob_path` from `bucket_name`.
///
/// Returns the contents only in string mode. A missing blob fails with
/// [`TransferError::BlobNotFound`] before the destination is touched.
pub async fn download(
    client: &dyn StorageClient,
    bucket_name: &str,
    blob_path: &str,
    target: Download<'_>,
) -> Result<Option<Bytes>, TransferError> {
    let destination = target.into_destination()?;
    let bucket = client.bucket(bucket_name).await?;
    let data = bucket.get(blob_path).await?;

    tracing::debug!(bucket = bucket_name, blob = blob_path, size = data.len(), "Downloaded blob");

    match destination {
        Destination::Filename(path) => {
            tokio::fs::write(path, &data).await?;
            Ok(None)
        }
        Destination::String => Ok(Some(data)),
        Destination::Stream(writer) => {
            writer.write_all(&data).await?;
            writer.flush().await?;
            Ok(None)
        }
    }
}

/// Delete every blob under `prefix` in one batch. Returns how many were removed.
pub async fn wipe(
    client: &dyn StorageClient,
    prefix: &str,
    bucket_name: &str,
) -> Result<usize, TransferError> {
    let bucket = client.bucket(bucket_name).await?;
    let blobs = bucket.list(prefix).await?;
    bucket.delete_many(&blobs).await?;

    tracing::info!(bucket = bucket_name, prefix, count = blobs.len(), "Wiped storage folder");
    Ok(blobs.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_requires_a_mode() {
        assert!(matches!(
            Upload::new().into_source(),
            Err(TransferError::AmbiguousUploadMode)
        ));
    }

    #[test]
    fn test_upload_rejects_two_modes() {
        let upload = Upload::new().string("hello").filename("/tmp/hello.txt");
        assert!(matches!(
            upload.into_source(),
            Err(TransferError::AmbiguousUploadMode)
        ));
    }

    #[test]
    fn test_upload_single_mode() {
        let source = Upload::new().string("hello").into_source().unwrap();
        assert!(matches!(source, UploadSource::String(ref b) if b == "hello"));
    }

    #[test]
    fn test_download_mode_validation() {
        assert!(Download::new().into_destination().is_err());
        assert!(Download::new()
            .string()
            .filename("/tmp/out")
            .into_destination()
            .is_err());
        assert!(matches!(
            Download::new().string().into_destination(),
            Ok(Destination::String)
        ));
    }

    #[test]
    fn test_not_found_maps_to_transfer_error() {
        let err = TransferError::from(ObjectStoreError::BlobNotFound("a/b".to_string()));
        assert!(matches!(err, TransferError::BlobNotFound(ref p) if p == "a/b"));
    }
}
