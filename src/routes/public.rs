use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client.
/// Everything data-bearing sits behind the authenticated tiers; the public
/// surface is only the liveness endpoint and the registration gateway. (Stored
/// file objects are also publicly readable, but they are served by the storage
/// gateway directly, not by this application.)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load balancer checks.
        // Returns "ok" immediately to verify the service is running and responsive.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // New user creation and initial profile/role provisioning. Part of the
        // identity flow managed by the external auth provider in production.
        .route("/register", post(handlers::register_user))
}
