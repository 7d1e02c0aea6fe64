use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Defines the routes accessible to any principal who has passed the
/// authentication layer, whatever their role set. This covers browsing the
/// catalog, recording usage, and maintaining one's own profile.
///
/// Access Control Strategy:
/// Every handler in this module relies on the `AuthUser` extractor middleware
/// being present on the router layer above it, then consults the policy table
/// before acting. Owner-or-admin row scoping (resource update/delete) is
/// enforced inside the repository queries, so foreign rows answer 404.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET/PUT /me
        // The caller's own profile: read with resolved role set, owner-only update.
        .route("/me", get(handlers::get_me).put(handlers::update_me))
        // --- Resource Catalog ---
        // GET /resources?search=...&category=...
        // Catalog listing ordered by creation time, with text and category filters.
        .route("/resources", get(handlers::list_resources))
        // GET/PUT/DELETE /resources/{id}
        // Detail view for everyone; owner-or-admin modification. Strict ownership
        // check enforced in the repository layer.
        .route(
            "/resources/{id}",
            get(handlers::get_resource_details)
                .put(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        // --- Usage Recorder ---
        // POST /resources/{id}/view
        // Appends one view event attributed to the caller and atomically bumps
        // the counter, transactionally.
        .route("/resources/{id}/view", post(handlers::record_view))
        // POST /resources/{id}/download
        // Lone atomic download-counter increment.
        .route("/resources/{id}/download", post(handlers::record_download))
        // GET /categories
        // Category listing for filter dropdowns; read-only at this tier.
        .route("/categories", get(handlers::list_categories))
}
