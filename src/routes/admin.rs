use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Admin Router Module
///
/// Defines the routes exclusively accessible to principals with the 'admin'
/// role: the user overview and role-assignment management.
///
/// Access Control:
/// This router is nested under '/admin' behind the authentication middleware;
/// the admin role check itself is the policy gate inside each handler. This
/// prevents any unauthorized access to role provisioning.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/users
        // Every profile joined with its role set and owned-resource count, plus
        // per-role headcounts. Used for oversight and provisioning.
        .route("/users", get(handlers::get_users))
        // POST /admin/users/{id}/roles
        // Grants a role to a principal. Idempotent insert; duplicates answer 409.
        .route("/users/{id}/roles", post(handlers::grant_role))
        // DELETE /admin/users/{id}/roles/{role}
        // Revokes a (principal, role) pair. Owned resources are untouched:
        // edit rights are ownership-based, not role-based.
        .route("/users/{id}/roles/{role}", delete(handlers::revoke_role))
}
