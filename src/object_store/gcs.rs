use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::{ObjectStore, ObjectStoreError, StorageClient};
use crate::cloud::auth::TokenProvider;

const API_BASE: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";
const PUBLIC_BASE: &str = "https://storage.googleapis.com";

/// Google Cloud Storage client; hands out one `GcsStore` per bucket.
pub struct GcsClient {
    tokens: Arc<TokenProvider>,
}

impl GcsClient {
    pub fn new(tokens: Arc<TokenProvider>) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl StorageClient for GcsClient {
    /// Looks the bucket up remotely so a misspelled name fails here, not on first use.
    async fn bucket(&self, name: &str) -> Result<Arc<dyn ObjectStore>, ObjectStoreError> {
        let url = segments_url(API_BASE, &["b", name])?;
        let resp = self
            .tokens
            .http()
            .get(url)
            .bearer_auth(bearer(&self.tokens).await?)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::BucketNotFound(name.to_string()));
        }
        check(resp, "bucket lookup").await?;

        Ok(Arc::new(GcsStore {
            bucket: name.to_string(),
            tokens: Arc::clone(&self.tokens),
        }))
    }
}

/// One Google Cloud Storage bucket.
pub struct GcsStore {
    bucket: String,
    tokens: Arc<TokenProvider>,
}

#[derive(Deserialize)]
struct ObjectMetadata {
    /// The JSON API encodes uint64 as a string
    size: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectName>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ObjectName {
    name: String,
}

impl GcsStore {
    fn object_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        segments_url(API_BASE, &["b", &self.bucket, "o", key])
    }

    fn upload_url(&self, key: &str) -> Result<Url, ObjectStoreError> {
        let mut url = segments_url(UPLOAD_BASE, &["b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> Result<Url, ObjectStoreError> {
        let mut url = segments_url(API_BASE, &["b", &self.bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("prefix", prefix);
            query.append_pair("fields", "items(name),nextPageToken");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn metadata(&self, key: &str) -> Result<Option<ObjectMetadata>, ObjectStoreError> {
        let resp = self
            .tokens
            .http()
            .get(self.object_url(key)?)
            .bearer_auth(bearer(&self.tokens).await?)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check(resp, "metadata lookup").await?;
        let meta = resp
            .json()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
        Ok(Some(meta))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn bucket_name(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let content_type = mime_guess::from_path(key)
            .first_or_octet_stream()
            .to_string();

        let resp = self
            .tokens
            .http()
            .post(self.upload_url(key)?)
            .bearer_auth(bearer(&self.tokens).await?)
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        check(resp, "upload").await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let mut url = self.object_url(key)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let resp = self
            .tokens
            .http()
            .get(url)
            .bearer_auth(bearer(&self.tokens).await?)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::BlobNotFound(key.to_string()));
        }

        check(resp, "download")
            .await?
            .bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resp = self
            .tokens
            .http()
            .delete(self.object_url(key)?)
            .bearer_auth(bearer(&self.tokens).await?)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(resp, "delete").await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.metadata(key).await?.is_some())
    }

    async fn size(&self, key: &str) -> Result<Option<u64>, ObjectStoreError> {
        match self.metadata(key).await? {
            Some(meta) => meta
                .size
                .parse()
                .map(Some)
                .map_err(|_| ObjectStoreError::Backend(format!("Invalid object size: {}", meta.size))),
            None => Ok(None),
        }
    }

    fn public_url(&self, key: &str) -> String {
        let mut segments = vec![self.bucket.as_str()];
        segments.extend(key.split('/'));
        match segments_url(PUBLIC_BASE, &segments) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{PUBLIC_BASE}/{}/{key}", self.bucket),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let resp = self
                .tokens
                .http()
                .get(self.list_url(prefix, page_token.as_deref())?)
                .bearer_auth(bearer(&self.tokens).await?)
                .send()
                .await
                .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

            let page: ObjectList = check(resp, "list")
                .await?
                .json()
                .await
                .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

            keys.extend(page.items.into_iter().map(|o| o.name));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), ObjectStoreError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }
}

/// Append each segment percent-encoded, so `/` inside a blob name becomes `%2F`.
fn segments_url(base: &str, segments: &[&str]) -> Result<Url, ObjectStoreError> {
    let mut url = Url::parse(base).map_err(|e| ObjectStoreError::Backend(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ObjectStoreError::Backend(format!("Cannot extend base URL {base}")))?
        .extend(segments);
    Ok(url)
}

async fn bearer(tokens: &TokenProvider) -> Result<String, ObjectStoreError> {
    tokens
        .token()
        .await
        .map_err(|e| ObjectStoreError::Backend(e.to_string()))
}

async fn check(
    resp: reqwest::Response,
    action: &str,
) -> Result<reqwest::Response, ObjectStoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(ObjectStoreError::Backend(format!(
        "GCS {action} failed ({status}): {body}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_names_are_encoded_as_one_segment() {
        let url = segments_url(API_BASE, &["b", "ligexprj", "o", "science/2017-07-10/a b.png"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage.googleapis.com/storage/v1/b/ligexprj/o/science%2F2017-07-10%2Fa%20b.png"
        );
    }

    #[test]
    fn test_public_url_keeps_directory_separators() {
        let mut segments = vec!["ligex"];
        segments.extend("a/b.txt".split('/'));
        let url = segments_url(PUBLIC_BASE, &segments).unwrap();
        assert_eq!(url.as_str(), "https://storage.googleapis.com/ligex/a/b.txt");
    }
}
