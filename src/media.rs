//! Media storage backend for post image fields.
//!
//! Every blob lives under a fixed namespace (the "location") inside one
//! bucket. Callers pass names relative to that namespace; names that already
//! carry it are used as-is.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::object_store::{ObjectStore, ObjectStoreError};

/// Returned by [`MediaStorage::url`] for a name with no blob behind it.
pub const MISSING_URL: &str = "File does not exist.";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Blob not found: {0}")]
    BlobNotFound(String),
    #[error(
        "Storage can not find an available filename for \"{0}\". \
         Please make sure that the corresponding file field allows sufficient max_length."
    )]
    NameResolutionExhausted(String),
    #[error(transparent)]
    Store(ObjectStoreError),
}

impl From<ObjectStoreError> for MediaError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::BlobNotFound(path) => MediaError::BlobNotFound(path),
            other => MediaError::Store(other),
        }
    }
}

#[derive(Clone)]
pub struct MediaStorage {
    bucket: Arc<dyn ObjectStore>,
    location: String,
}

impl MediaStorage {
    pub fn new(bucket: Arc<dyn ObjectStore>, location: &str) -> Self {
        Self {
            bucket,
            location: location.trim_matches('/').to_string(),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Effective blob path for `name`.
    pub fn resolve(&self, name: &str) -> String {
        let name = name.trim_start_matches('/');
        let already_prefixed = name
            .strip_prefix(self.location.as_str())
            .is_some_and(|rest| rest.starts_with('/'));
        if already_prefixed {
            name.to_string()
        } else {
            format!("{}/{}", self.location, name)
        }
    }

    /// Open the blob for reading.
    pub async fn open(&self, name: &str) -> Result<Box<dyn AsyncRead + Send + Unpin>, MediaError> {
        let path = self.resolve(name);
        let data = self.bucket.get(&path).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    /// Store `content` under `name` and return the stored (resolved) name.
    pub async fn save(&self, name: &str, content: Bytes) -> Result<String, MediaError> {
        let path = self.resolve(name);
        let size = content.len();
        if let Err(e) = self.bucket.put(&path, content).await {
            tracing::error!(blob = %path, error = %e, "Failed to save media");
            return Err(e.into());
        }
        tracing::debug!(blob = %path, size, "Saved media");
        Ok(path)
    }

    pub async fn delete(&self, name: &str) -> Result<(), MediaError> {
        let path = self.resolve(name);
        if self.bucket.exists(&path).await? {
            self.bucket.delete(&path).await?;
            tracing::debug!(blob = %path, "Deleted media");
        }
        Ok(())
    }

    pub async fn exists(&self, name: &str) -> Result<bool, MediaError> {
        Ok(self.bucket.exists(&self.resolve(name)).await?)
    }

    /// Public URL of the blob, or [`MISSING_URL`] when it does not exist.
    pub async fn url(&self, name: &str) -> Result<String, MediaError> {
        let path = self.resolve(name);
        if self.bucket.exists(&path).await? {
            Ok(self.bucket.public_url(&path))
        } else {
            Ok(MISSING_URL.to_string())
        }
    }

    pub async fn size(&self, name: &str) -> Result<u64, MediaError> {
        let path = self.resolve(name);
        let size = self.bucket.size(&path).await?;
        size.ok_or(MediaError::BlobNotFound(path))
    }

    /// A name that is free in the bucket and, if given, no longer than `max_length`.
    pub async fn get_available_name(
        &self,
        name: &str,
        max_length: Option<usize>,
    ) -> Result<String, MediaError> {
        self.get_available_name_at(name, max_length, Local::now())
            .await
    }

    /// [`get_available_name`](Self::get_available_name) with an explicit timestamp.
    pub async fn get_available_name_at(
        &self,
        name: &str,
        max_length: Option<usize>,
        now: DateTime<Local>,
    ) -> Result<String, MediaError> {
        let mut candidate = CandidateName::new(name, now);
        let mut current = name.to_string();
        let too_long = |n: &str| max_length.is_some_and(|max| n.chars().count() > max);

        while too_long(&current) || self.exists(&current).await? {
            current = candidate.next();
            if let Some(max) = max_length {
                let overflow = current.chars().count().saturating_sub(max);
                if overflow > 0 {
                    if !candidate.truncate(overflow) {
                        return Err(MediaError::NameResolutionExhausted(current));
                    }
                    current = candidate.render();
                }
            }
        }

        Ok(current)
    }
}

/// Splits a name into directory, root and extension and renders timestamped variants of it.
struct CandidateName {
    dir: String,
    root: String,
    ext: String,
    stamp: String,
    attempt: u32,
}

impl CandidateName {
    fn new(name: &str, now: DateTime<Local>) -> Self {
        let (dir, file) = match name.rsplit_once('/') {
            Some((dir, file)) => (dir.to_string(), file),
            None => (String::new(), name),
        };
        let (root, ext) = match file.rfind('.') {
            Some(idx) if idx > 0 => (file[..idx].to_string(), file[idx..].to_string()),
            _ => (file.to_string(), String::new()),
        };
        Self {
            dir,
            root,
            ext,
            stamp: now.format("%Y-%m-%d-%H:%M:%S").to_string(),
            attempt: 0,
        }
    }

    /// Advance to the next suffix and render it.
    fn next(&mut self) -> String {
        self.attempt += 1;
        self.render()
    }

    fn render(&self) -> String {
        let suffix = if self.attempt <= 1 {
            self.stamp.clone()
        } else {
            format!("{}-{}", self.stamp, self.attempt - 1)
        };
        let file = format!("{}_{}{}", self.root, suffix, self.ext);
        if self.dir.is_empty() {
            file
        } else {
            format!("{}/{}", self.dir, file)
        }
    }

    /// Drop `count` trailing characters from the root. False once the root would be empty.
    fn truncate(&mut self, count: usize) -> bool {
        let keep = self.root.chars().count().saturating_sub(count);
        if keep == 0 {
            return false;
        }
        self.root = self.root.chars().take(keep).collect();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::MemoryStore;
    use chrono::TimeZone;

    fn storage() -> MediaStorage {
        MediaStorage::new(Arc::new(MemoryStore::new("ligexprj")), "science")
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2017, 7, 10, 23, 43, 5).unwrap()
    }

    #[test]
    fn test_resolve_prefixes_namespace() {
        let media = storage();
        assert_eq!(media.resolve("2017-07-10/a.png"), "science/2017-07-10/a.png");
        assert_eq!(media.resolve("/a.png"), "science/a.png");
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let media = storage();
        let once = media.resolve("2017-07-10/a.png");
        assert_eq!(media.resolve(&once), once);
    }

    #[test]
    fn test_resolve_only_matches_whole_segment() {
        let media = storage();
        assert_eq!(media.resolve("sciencefair/a.png"), "science/sciencefair/a.png");
        assert_eq!(media.resolve("posts/science/a.png"), "science/posts/science/a.png");
    }

    #[test]
    fn test_candidate_name_rendering() {
        let mut c = CandidateName::new("2017-07-10/photo.png", fixed_now());
        assert_eq!(c.next(), "2017-07-10/photo_2017-07-10-23:43:05.png");
        assert_eq!(c.next(), "2017-07-10/photo_2017-07-10-23:43:05-1.png");
    }

    #[test]
    fn test_candidate_name_without_extension_or_dir() {
        let mut c = CandidateName::new("README", fixed_now());
        assert_eq!(c.next(), "README_2017-07-10-23:43:05");

        let c = CandidateName::new(".hidden", fixed_now());
        assert_eq!(c.root, ".hidden");
        assert_eq!(c.ext, "");
    }

    #[tokio::test]
    async fn test_available_name_unchanged_when_free() {
        let media = storage();
        let name = media
            .get_available_name_at("2017-07-10/a.png", Some(100), fixed_now())
            .await
            .unwrap();
        assert_eq!(name, "2017-07-10/a.png");
    }

    #[tokio::test]
    async fn test_available_name_suffixed_on_collision() {
        let media = storage();
        media
            .save("2017-07-10/a.png", Bytes::from("one"))
            .await
            .unwrap();

        let name = media
            .get_available_name_at("2017-07-10/a.png", None, fixed_now())
            .await
            .unwrap();
        assert_eq!(name, "2017-07-10/a_2017-07-10-23:43:05.png");
        assert!(!media.exists(&name).await.unwrap());
    }

    #[tokio::test]
    async fn test_available_name_skips_taken_stamp() {
        let media = storage();
        media.save("a.png", Bytes::from("1")).await.unwrap();
        media
            .save("a_2017-07-10-23:43:05.png", Bytes::from("2"))
            .await
            .unwrap();

        let name = media
            .get_available_name_at("a.png", None, fixed_now())
            .await
            .unwrap();
        assert_eq!(name, "a_2017-07-10-23:43:05-1.png");
    }

    #[tokio::test]
    async fn test_available_name_truncates_root() {
        let media = storage();
        let long = format!("{}.png", "x".repeat(40));
        let name = media
            .get_available_name_at(&long, Some(30), fixed_now())
            .await
            .unwrap();
        assert_eq!(name.chars().count(), 30);
        assert!(name.ends_with("_2017-07-10-23:43:05.png"));
        assert!(name.starts_with("xxxxx"));
    }

    #[tokio::test]
    async fn test_available_name_exhausted() {
        let media = storage();
        let err = media
            .get_available_name_at("photo.png", Some(5), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NameResolutionExhausted(_)));
    }

    #[tokio::test]
    async fn test_url_and_size() {
        let media = storage();
        assert_eq!(media.url("a.txt").await.unwrap(), MISSING_URL);
        assert!(matches!(
            media.size("a.txt").await,
            Err(MediaError::BlobNotFound(_))
        ));

        let stored = media.save("a.txt", Bytes::from("hello")).await.unwrap();
        assert_eq!(stored, "science/a.txt");
        assert_eq!(media.size("a.txt").await.unwrap(), 5);
        assert_eq!(media.size(&stored).await.unwrap(), 5);
        assert_eq!(media.url("a.txt").await.unwrap(), "memory://ligexprj/science/a.txt");
    }

    #[tokio::test]
    async fn test_open_and_delete() {
        use tokio::io::AsyncReadExt;

        let media = storage();
        assert!(matches!(
            media.open("missing.txt").await,
            Err(MediaError::BlobNotFound(_))
        ));

        media.save("b.txt", Bytes::from("body")).await.unwrap();
        let mut reader = media.open("b.txt").await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "body");

        media.delete("b.txt").await.unwrap();
        assert!(!media.exists("b.txt").await.unwrap());
        // Deleting again is a no-op
        media.delete("b.txt").await.unwrap();
    }
}
