use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;

    let mut router = Router::new()
        // Posts
        .route("/", get(handlers::home))
        .route("/posts/:id", get(handlers::post_detail))
        .route(
            "/admin/posts",
            post(handlers::create_post).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/admin/posts/:id", delete(handlers::delete_post))
        // Job registry
        .route("/admin/jobs", post(handlers::create_job))
        .route(
            "/admin/jobs/:job_num",
            get(handlers::get_job)
                .put(handlers::update_job)
                .delete(handlers::delete_job),
        )
        .route("/admin/machine-types/:cpus", get(handlers::machine_type))
        // Buckets
        .route(
            "/admin/buckets/:bucket/objects",
            delete(handlers::wipe_objects),
        )
        .route(
            "/admin/buckets/:bucket/objects/*path",
            get(handlers::download_object)
                .put(handlers::upload_object)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Media content
        .route("/media/*name", get(handlers::serve_media))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled: purge route is available.");
        router = router.route("/admin/purge", delete(handlers::admin_purge));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
