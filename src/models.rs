use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Role & File-Type Vocabulary ---

/// Role
///
/// The RBAC vocabulary. A principal may hold several roles at once; the
/// `user_roles` table stores one row per (user, role) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Maps the database text representation to the enum. Unknown strings are
    /// dropped rather than erroring, so a bad row cannot poison a role lookup.
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }
}

/// FileType
///
/// Display classification of an uploaded object, derived once at upload time
/// from the multipart content type and stored as text on the catalog row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum FileType {
    Video,
    Image,
    Pdf,
    Other,
}

impl FileType {
    /// Derivation rule: `video/*` and `image/*` match by prefix, PDF matches
    /// the exact MIME type, everything else is bucketed as "other".
    pub fn from_content_type(content_type: &str) -> FileType {
        if content_type.starts_with("video/") {
            FileType::Video
        } else if content_type.starts_with("image/") {
            FileType::Image
        } else if content_type == "application/pdf" {
            FileType::Pdf
        } else {
            FileType::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Video => "video",
            FileType::Image => "image",
            FileType::Pdf => "pdf",
            FileType::Other => "other",
        }
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// Profile
///
/// Display metadata for a principal, stored in `profiles`. One-to-one with the
/// identity issued by the external auth provider; the primary key mirrors the
/// provider's user id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Category
///
/// Named grouping for resources. Deleting a category does not delete its
/// resources; their reference is nulled out and they display as "Uncategorized".
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Resource
///
/// A catalog row for one uploaded learning material. The two counters are
/// denormalized aggregates maintained by atomic SQL increments; `resource_views`
/// is the ground-truth event log behind `view_count`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Resource {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    // FK to categories.id, ON DELETE SET NULL.
    pub category_id: Option<Uuid>,
    // Public URL of the stored object.
    pub file_url: String,
    // "video" | "image" | "pdf" | "other"
    pub file_type: String,
    pub file_size: i64,
    // FK to profiles.id (owner). Edit rights are ownership-based, so revoking
    // the uploader's teacher role later does not strip them.
    pub uploaded_by: Uuid,
    pub view_count: i64,
    pub download_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ResourceWithMeta
///
/// A catalog row enriched with display names resolved in a single joined query
/// (no per-row lookups). `category_name` is None for uncategorized resources;
/// the frontend renders the "Uncategorized" fallback.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ResourceWithMeta {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
    pub view_count: i64,
    pub download_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    // Loaded via LEFT JOINs in the repository query.
    #[sqlx(default)]
    pub category_name: Option<String>,
    #[sqlx(default)]
    pub uploader_name: Option<String>,
}

/// ViewEvent
///
/// Immutable append-only record of one resource view. `user_id` is nullable so
/// events survive the deletion of the acting principal.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct ViewEvent {
    pub id: i64,
    pub resource_id: Uuid,
    pub user_id: Option<Uuid>,
    #[ts(type = "string")]
    pub viewed_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for the public registration endpoint (POST /register).
/// The password is only passed through to the external identity provider and
/// never persisted or logged internally by this application.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

/// UpdateProfileRequest
///
/// Owner-only partial update of display metadata (PUT /me).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// CategoryPayload
///
/// Input payload for creating or renaming a category.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CategoryPayload {
    pub name: String,
}

/// UpdateResourceRequest
///
/// Partial update payload for modifying an existing resource (PUT /resources/{id}).
/// Uses `Option<T>` for all fields so only provided fields are written
/// (COALESCE at the SQL layer).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateResourceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
}

/// NewResource
///
/// Internal insert payload assembled by the upload handler after the object
/// store write has succeeded. Not part of the wire API.
#[derive(Debug, Clone, Default)]
pub struct NewResource {
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: Uuid,
}

/// AssignRoleRequest
///
/// Admin payload for granting a role (POST /admin/users/{id}/roles).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AssignRoleRequest {
    pub role: Role,
}

// --- Profile & Dashboard Schemas (Output) ---

/// UserProfile
///
/// Output schema for the authenticated user's own profile (GET /me), combining
/// the `profiles` row with the resolved role set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<Role>,
}

/// CategoryCount
///
/// One bucket of the category distribution. `category` is the resolved name;
/// resources with no category form their own bucket labelled "Uncategorized",
/// kept distinct from any real category of that name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct CategoryCount {
    pub category: String,
    pub count: i64,
}

/// AnalyticsSummary
///
/// Output schema for GET /analytics/summary. The view/download totals are sums
/// of the denormalized per-resource counters, not of `resource_views` rows; the
/// two sources can diverge and the counters are the published numbers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AnalyticsSummary {
    pub total_resources: i64,
    pub total_views: i64,
    pub total_downloads: i64,
    pub category_distribution: Vec<CategoryCount>,
}

/// DailyViews
///
/// One calendar-day bucket of the trailing 7-day view trend.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DailyViews {
    #[ts(type = "string")]
    #[schema(value_type = String, example = "2026-08-29")]
    pub day: NaiveDate,
    pub count: i64,
}

/// UserOverview
///
/// One row of the admin user listing: a profile joined with its role set and
/// the count of resources it owns, produced by a single grouped query.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct UserOverview {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<String>,
    pub resource_count: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// RoleTotals
///
/// Per-role headcounts derived by scanning the user listing. The buckets are
/// not mutually exclusive: a principal holding two roles counts in both.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct RoleTotals {
    pub students: i64,
    pub teachers: i64,
    pub admins: i64,
}

/// AdminUsersResponse
///
/// Output schema for GET /admin/users.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminUsersResponse {
    pub users: Vec<UserOverview>,
    pub totals: RoleTotals,
}
