use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};

/// Upper bound on the multipart upload body. Lecture videos dominate the
/// catalog and routinely run to hundreds of megabytes, far past axum's
/// 2 MiB default request cap.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Staff Router Module
///
/// Defines the routes for the teacher/admin tier: resource upload, category
/// management and the analytics screens.
///
/// Access Control:
/// The authentication middleware above this module guarantees a resolved
/// `AuthUser`; the teacher-or-admin gate itself is the policy check at the top
/// of each handler, so a plain student hitting these endpoints receives 403.
pub fn staff_routes() -> Router<AppState> {
    Router::new()
        // POST /resources
        // Multipart upload: file bytes through the server, object store first,
        // catalog row second. The widened body limit applies to this route
        // only; every other endpoint keeps the framework default.
        .route(
            "/resources",
            post(handlers::upload_resource).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        // POST /categories
        // PUT/DELETE /categories/{id}
        // Category management. Deleting a category nulls references instead of
        // cascading into resources.
        .route("/categories", post(handlers::create_category))
        .route(
            "/categories/{id}",
            put(handlers::rename_category).delete(handlers::delete_category),
        )
        // --- Analytics (pure reads) ---
        // GET /analytics/summary: totals and category distribution.
        .route("/analytics/summary", get(handlers::analytics_summary))
        // GET /analytics/trend: trailing 7-day daily view counts.
        .route("/analytics/trend", get(handlers::analytics_trend))
        // GET /analytics/top: top 5 resources by view count.
        .route("/analytics/top", get(handlers::analytics_top))
}
