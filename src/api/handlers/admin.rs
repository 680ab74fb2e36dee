use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub posts_deleted: u64,
    pub jobs_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: format!("{:?}", state.config.cloud.backend).to_lowercase(),
    })
}

/// Purge posts and locally stored jobs. Media blobs are left in place.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let stats = state.db.purge_all()?;

    tracing::warn!(posts = stats.posts, jobs = stats.jobs, "Purged all data");

    Ok(JSend::success(PurgeResponse {
        posts_deleted: stats.posts,
        jobs_deleted: stats.jobs,
    }))
}
