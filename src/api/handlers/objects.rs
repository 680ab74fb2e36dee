use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend};
use crate::object_store::transfer::{self, Download, Upload};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub bucket: String,
    pub path: String,
    pub byte_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct WipeParams {
    #[serde(default)]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
pub struct WipeResponse {
    pub blobs_deleted: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Upload one blob. The multipart body carries either a `content` text field
/// or a `file` field, never both.
pub async fn upload_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut upload = Upload::new();
    let mut byte_size = 0u64;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "content" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid content: {e}")))?;
                byte_size = text.len() as u64;
                upload = upload.string(text);
            }
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read file: {e}")))?;

                if data.len() as u64 > state.config.max_upload_size {
                    return Err(ApiError::payload_too_large(format!(
                        "File exceeds maximum upload size of {} bytes",
                        state.config.max_upload_size
                    )));
                }
                byte_size = data.len() as u64;
                upload = upload.stream(Cursor::new(data));
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    transfer::upload(state.cloud.storage.as_ref(), upload, &bucket, &path)
        .await?;

    Ok(JSend::success(UploadResponse {
        bucket,
        path,
        byte_size,
    }))
}

pub async fn download_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, path)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let data = transfer::download(
        state.cloud.storage.as_ref(),
        &bucket,
        &path,
        Download::new().string(),
    )
    .await?
    .ok_or_else(|| ApiError::internal("Download returned no content"))?;

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], data).into_response())
}

/// Delete every blob under `prefix`. An empty prefix is refused outside test mode.
pub async fn wipe_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    AppQuery(params): AppQuery<WipeParams>,
) -> Result<Json<JSend<WipeResponse>>, ApiError> {
    if params.prefix.is_empty() && !state.config.test_mode {
        return Err(ApiError::bad_request("prefix must not be empty"));
    }

    let count = transfer::wipe(state.cloud.storage.as_ref(), &params.prefix, &bucket)
        .await?;

    Ok(JSend::success(WipeResponse {
        blobs_deleted: count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::test_state;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_download_and_wipe() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let bucket = state.cloud.default_job_bucket.clone();
        bucket.put("7/out.txt", Bytes::from("result")).await.unwrap();
        bucket.put("7/log.txt", Bytes::from("log")).await.unwrap();
        bucket.put("8/out.txt", Bytes::from("other")).await.unwrap();

        let resp = download_object(
            State(Arc::clone(&state)),
            Path(("ligexprj".to_string(), "7/out.txt".to_string())),
        )
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let Json(wiped) = wipe_objects(
            State(Arc::clone(&state)),
            Path("ligexprj".to_string()),
            AppQuery(WipeParams {
                prefix: "7/".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(wiped.data.blobs_deleted, 2);
        assert!(bucket.exists("8/out.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_download_missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;

        let err = download_object(
            State(Arc::clone(&state)),
            Path(("ligex".to_string(), "nope.txt".to_string())),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Fail(StatusCode::NOT_FOUND, _)));

        let err = download_object(
            State(state),
            Path(("no-such-bucket".to_string(), "a.txt".to_string())),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(err, ApiError::Fail(StatusCode::NOT_FOUND, _)));
    }
}
