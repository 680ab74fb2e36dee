use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::api::response::ApiError;
use crate::AppState;

/// Stream media content by stored name.
/// Route: GET /media/*name
pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let reader = state.media.open(&name).await?;

    let mut response = (StatusCode::OK, Body::from_stream(ReaderStream::new(reader))).into_response();
    let headers = response.headers_mut();

    let content_type = mime_guess::from_path(&name).first_or_octet_stream();
    if let Ok(value) = content_type.as_ref().parse() {
        headers.insert(header::CONTENT_TYPE, value);
    }

    // Set Content-Disposition with the file name from the last path segment
    let filename = name.rsplit('/').next().unwrap_or(&name);
    if let Ok(value) = format!("inline; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Post media names are unique: a taken name gets a timestamp suffix
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("public, max-age=3600"),
    );

    Ok(response)
}
