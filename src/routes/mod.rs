/// Router Module Index
///
/// Organizes the application's routing logic into security-segregated modules,
/// enforcing a Defense-in-Depth strategy. Access control is applied explicitly
/// at the module level (via Axum layers), preventing accidental exposure of
/// protected endpoints.
///
/// The four modules map onto the route surface's role tiers.

/// Routes accessible to all clients (health check, registration).
pub mod public;

/// Routes protected by the `AuthUser` extractor middleware: the catalog,
/// categories, usage recording and the caller's own profile.
pub mod authenticated;

/// Routes for the teacher/admin tier: uploads, category management, analytics.
/// The role gate is the policy check inside each handler.
pub mod staff;

/// Routes restricted exclusively to principals with the 'admin' role:
/// the user overview and role grants/revocations.
pub mod admin;
