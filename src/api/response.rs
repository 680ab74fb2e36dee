//! JSend envelopes, the handler error type and extractors that reject in JSend form.
//!
//! Successful calls answer `{"status": "success", "data": ...}`. Client errors
//! answer `{"status": "fail", "data": {"message": ...}}` and server errors
//! answer `{"status": "error", "message": ...}`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::datastore::DatastoreError;
use crate::media::MediaError;
use crate::object_store::transfer::TransferError;
use crate::object_store::ObjectStoreError;
use crate::storage::DatabaseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JSendStatus {
    Error,
    Fail,
    Success,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JSend<T: Serialize> {
    pub data: T,
    pub status: JSendStatus,
}

impl<T: Serialize> JSend<T> {
    pub fn success(data: T) -> Json<JSend<T>> {
        Json(JSend {
            data,
            status: JSendStatus::Success,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JSendPaginated<T: Serialize> {
    pub data: PaginatedData<T>,
    pub status: JSendStatus,
}

#[derive(Debug, Serialize)]
pub struct PaginatedData<T: Serialize> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
    pub total: u64,
}

impl Pagination {
    /// Index range of the current page within `total` items.
    pub fn window(&self) -> std::ops::Range<usize> {
        let total = self.total as usize;
        let start = (self.offset as usize).min(total);
        let end = start.saturating_add(self.limit as usize).min(total);
        start..end
    }
}

impl<T: Serialize> JSendPaginated<T> {
    pub fn success(items: Vec<T>, pagination: Pagination) -> Json<JSendPaginated<T>> {
        Json(JSendPaginated {
            data: PaginatedData { items, pagination },
            status: JSendStatus::Success,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FailData {
    pub message: String,
}

/// 4xx body.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendFail {
    pub data: FailData,
    pub status: JSendStatus,
}

/// 5xx body.
#[derive(Debug, Serialize, Deserialize)]
pub struct JSendError {
    pub message: String,
    pub status: JSendStatus,
}

// ============================================================================
// Handler errors
// ============================================================================

/// A JSend-compatible error that can be either a fail (4xx) or error (5xx).
#[derive(Debug, PartialEq)]
pub enum ApiError {
    Fail(StatusCode, String),
    Error(StatusCode, String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::BAD_REQUEST, message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::NOT_FOUND, message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::PAYLOAD_TOO_LARGE, message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Fail(StatusCode::CONFLICT, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Fail(code, _) | ApiError::Error(code, _) => *code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Fail(code, message) => (
                code,
                Json(JSendFail {
                    data: FailData { message },
                    status: JSendStatus::Fail,
                }),
            )
                .into_response(),
            ApiError::Error(code, message) => {
                tracing::error!(status = %code, %message, "Request failed");
                (
                    code,
                    Json(JSendError {
                        message,
                        status: JSendStatus::Error,
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<DatastoreError> for ApiError {
    fn from(e: DatastoreError) -> Self {
        match e {
            DatastoreError::EntityNotFound(_) => ApiError::not_found(e.to_string()),
            DatastoreError::DuplicateJobNumber(_) => ApiError::conflict(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        match e {
            TransferError::AmbiguousUploadMode | TransferError::AmbiguousDownloadMode => {
                ApiError::bad_request(e.to_string())
            }
            TransferError::BlobNotFound(_)
            | TransferError::Store(ObjectStoreError::BucketNotFound(_)) => {
                ApiError::not_found(e.to_string())
            }
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::BlobNotFound(_) => ApiError::not_found("File not found"),
            MediaError::NameResolutionExhausted(_) => ApiError::bad_request(e.to_string()),
            MediaError::Store(_) => ApiError::internal(format!("Media storage failed: {e}")),
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// `axum::Json` that rejects with a JSend fail body.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, ApiError> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::bad_request(json_rejection_message(&rejection)))?;
        Ok(AppJson(value))
    }
}

fn json_rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::JsonDataError(err) => format!("Invalid request body: {}", err.body_text()),
        JsonRejection::JsonSyntaxError(_) => "Malformed JSON in request body".into(),
        JsonRejection::MissingJsonContentType(_) => {
            "Missing Content-Type: application/json header".into()
        }
        _ => "Failed to read request body".into(),
    }
}

/// Query-string extractor backed by `serde_qs`.
pub struct AppQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for AppQuery<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, ApiError> {
        parse_query(parts.uri.query().unwrap_or_default())
    }
}

fn parse_query<T: DeserializeOwned>(query: &str) -> Result<AppQuery<T>, ApiError> {
    serde_qs::from_str(query)
        .map(AppQuery)
        .map_err(|e| ApiError::bad_request(friendly_query_error(&e.to_string())))
}

/// Replace Rust integer type names in deserializer messages.
fn friendly_query_error(raw: &str) -> String {
    let cleaned = ["u32", "u64"]
        .iter()
        .fold(raw.to_string(), |s, ty| s.replace(ty, "non-negative integer"));
    let cleaned = ["i32", "i64"]
        .iter()
        .fold(cleaned, |s, ty| s.replace(ty, "integer"));

    format!("Invalid query parameter: {cleaned}")
}
