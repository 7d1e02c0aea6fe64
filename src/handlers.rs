use crate::{
    AppState, analytics,
    auth::AuthUser,
    error::ApiError,
    models::{
        self, AdminUsersResponse, AnalyticsSummary, AssignRoleRequest, Category, CategoryPayload,
        DailyViews, FileType, NewResource, Profile, RegisterUserRequest, Resource,
        ResourceWithMeta, Role, UpdateProfileRequest, UpdateResourceRequest, UserProfile,
    },
    policy::{self, Action, Collection},
    storage::StorageState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

// --- Filter Structs ---

/// ResourceFilter
///
/// Accepted query parameters for the catalog listing endpoint (GET /resources).
/// Used by Axum's Query extractor to safely bind HTTP query parameters.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct ResourceFilter {
    /// Case-insensitive substring match against title OR description.
    pub search: Option<String>,
    /// Category name filter; absent, empty or "all" passes everything through.
    pub category: Option<String>,
}

/// SignupResponse
///
/// Minimal struct to deserialize the response from the external identity
/// provider's signup endpoint, capturing the newly created principal's UUID.
#[derive(Deserialize)]
struct SignupResponse {
    id: Uuid,
}

// --- Profile Handlers ---

/// get_me
///
/// [Authenticated Route] Returns the caller's own profile joined with its role set.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<UserProfile>, ApiError> {
    policy::require(auth.actor_owning(true), Action::Read, Collection::Profiles)?;

    let profile = state
        .repo
        .get_profile(auth.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(UserProfile {
        id: profile.id,
        full_name: profile.full_name,
        avatar_url: profile.avatar_url,
        roles: auth.roles,
    }))
}

/// update_me
///
/// [Authenticated Route] Owner-only partial update of display metadata.
#[utoipa::path(
    put,
    path = "/me",
    request_body = UpdateProfileRequest,
    responses((status = 200, description = "Updated", body = Profile))
)]
pub async fn update_me(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<Profile>, ApiError> {
    // The row is the caller's own by construction: the update is keyed on auth.id.
    policy::require(auth.actor_owning(true), Action::Update, Collection::Profiles)?;

    let profile = state
        .repo
        .update_profile(auth.id, payload)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(profile))
}

// --- Resource Catalog Handlers ---

/// list_resources
///
/// [Authenticated Route] Catalog listing ordered by creation time descending,
/// with optional text search and category-name filtering. Display names are
/// resolved via a single joined query.
#[utoipa::path(
    get,
    path = "/resources",
    params(ResourceFilter),
    responses((status = 200, description = "Filtered catalog", body = [ResourceWithMeta]))
)]
pub async fn list_resources(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<ResourceFilter>,
) -> Result<Json<Vec<ResourceWithMeta>>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::Resources)?;

    let search = filter.search.filter(|s| !s.trim().is_empty());
    let category = filter
        .category
        .filter(|c| !c.trim().is_empty() && c != "all");

    let resources = state.repo.list_resources(search, category).await?;
    Ok(Json(resources))
}

/// get_resource_details
///
/// [Authenticated Route] Single catalog row by ID; 404 when absent.
#[utoipa::path(
    get,
    path = "/resources/{id}",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses((status = 200, description = "Found", body = ResourceWithMeta))
)]
pub async fn get_resource_details(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResourceWithMeta>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::Resources)?;

    let resource = state
        .repo
        .get_resource(id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(resource))
}

/// upload_resource
///
/// [Staff Route] Multipart submission of a new learning resource. The object is
/// written to storage first; only then is the catalog row inserted, so a storage
/// failure never produces a dangling catalog entry. The reverse gap (catalog
/// insert failing after a successful store) orphans the object, which is logged
/// rather than silently swallowed.
#[utoipa::path(
    post,
    path = "/resources",
    responses(
        (status = 200, description = "Created", body = Resource),
        (status = 403, description = "Requires teacher or admin role"),
        (status = 422, description = "Missing title or file")
    )
)]
pub async fn upload_resource(
    auth: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Resource>, ApiError> {
    policy::require(auth.actor(), Action::Create, Collection::Resources)?;
    policy::require(auth.actor(), Action::Create, Collection::FileObjects)?;

    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut category_id: Option<Uuid> = None;
    let mut file: Option<(String, String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("title") => {
                title = Some(field.text().await.map_err(|e| {
                    ApiError::Validation(format!("unreadable title field: {}", e))
                })?);
            }
            Some("description") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::Validation(format!("unreadable description field: {}", e))
                })?;
                if !text.trim().is_empty() {
                    description = Some(text);
                }
            }
            Some("category_id") => {
                let text = field.text().await.map_err(|e| {
                    ApiError::Validation(format!("unreadable category_id field: {}", e))
                })?;
                if !text.trim().is_empty() {
                    category_id = Some(
                        Uuid::parse_str(text.trim())
                            .map_err(|_| ApiError::Validation("invalid category_id".into()))?,
                    );
                }
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("unreadable file field: {}", e)))?
                    .to_vec();
                file = Some((filename, content_type, bytes));
            }
            _ => {}
        }
    }

    let title = title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Validation("title is required".into()))?;
    let (filename, content_type, bytes) =
        file.ok_or_else(|| ApiError::Validation("file is required".into()))?;
    if bytes.is_empty() {
        return Err(ApiError::Validation("file is empty".into()));
    }

    let file_type = FileType::from_content_type(&content_type);
    let file_size = bytes.len() as i64;

    let extension = std::path::Path::new(&filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .unwrap_or("bin");

    let key = allocate_object_key(&state.storage, auth.id, extension).await?;
    let file_url = state
        .storage
        .put_object(&key, bytes, &content_type)
        .await
        .map_err(ApiError::Storage)?;

    let new = NewResource {
        title,
        description,
        category_id,
        file_url,
        file_type: file_type.as_str().to_string(),
        file_size,
        uploaded_by: auth.id,
    };

    let resource = state.repo.create_resource(new).await.map_err(|e| {
        // The object write already succeeded; the key is now orphaned in the bucket.
        tracing::warn!("catalog insert failed, orphaned object at {}: {:?}", key, e);
        ApiError::from(e)
    })?;

    Ok(Json(resource))
}

/// allocate_object_key
///
/// Generates an owner-namespaced object key with a random filename, probing the
/// bucket so a (vanishingly unlikely) UUID collision regenerates instead of
/// overwriting someone's upload.
async fn allocate_object_key(
    storage: &StorageState,
    owner: Uuid,
    extension: &str,
) -> Result<String, ApiError> {
    for _ in 0..3 {
        let key = format!("uploads/{}/{}.{}", owner, Uuid::new_v4(), extension);
        match storage.object_exists(&key).await {
            Ok(false) => return Ok(key),
            Ok(true) => continue,
            Err(e) => return Err(ApiError::Storage(e)),
        }
    }
    Err(ApiError::Storage(
        "could not allocate a free object key".into(),
    ))
}

/// update_resource
///
/// [Authenticated Route] Partial update of a catalog row.
///
/// *Authorization*: role-level gate here; the owner-or-admin row scope lives in
/// the repository's WHERE clause, so a foreign row answers 404, never 403.
#[utoipa::path(
    put,
    path = "/resources/{id}",
    request_body = UpdateResourceRequest,
    responses((status = 200, description = "Updated", body = Resource))
)]
pub async fn update_resource(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateResourceRequest>,
) -> Result<Json<Resource>, ApiError> {
    policy::require(auth.actor_owning(true), Action::Update, Collection::Resources)?;

    let resource = state
        .repo
        .update_resource(id, auth.id, auth.is_admin(), payload)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(resource))
}

/// delete_resource
///
/// [Authenticated Route] Owner-or-admin deletion of a catalog row. The stored
/// object is intentionally left behind; the orphaned key is logged so the gap
/// stays visible instead of silently accumulating.
#[utoipa::path(
    delete,
    path = "/resources/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found or Not Owner")
    )
)]
pub async fn delete_resource(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    policy::require(auth.actor_owning(true), Action::Delete, Collection::Resources)?;

    match state
        .repo
        .delete_resource(id, auth.id, auth.is_admin())
        .await?
    {
        Some(file_url) => {
            tracing::warn!("resource {} deleted, stored object orphaned: {}", id, file_url);
            Ok(StatusCode::NO_CONTENT)
        }
        // Either the resource didn't exist or the caller wasn't the owner;
        // both collapse to 404 so existence is not leaked.
        None => Err(ApiError::NotFound),
    }
}

// --- Usage Recorder Handlers ---

/// record_view
///
/// [Authenticated Route] Appends one view event attributed to the caller and
/// atomically bumps `view_count`, both within a single transaction.
#[utoipa::path(
    post,
    path = "/resources/{id}/view",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Recorded"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn record_view(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    // The event is attributed to the caller itself, so the "own principal id
    // only" rule holds by construction.
    policy::require(auth.actor_owning(true), Action::Create, Collection::ViewEvents)?;

    if state.repo.record_view(id, Some(auth.id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// record_download
///
/// [Authenticated Route] Atomic `download_count` increment. Downloads have no
/// event log, so this is a lone counter update.
#[utoipa::path(
    post,
    path = "/resources/{id}/download",
    params(("id" = Uuid, Path, description = "Resource ID")),
    responses(
        (status = 204, description = "Recorded"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn record_download(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::Resources)?;

    if state.repo.record_download(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Category Handlers ---

/// list_categories
///
/// [Authenticated Route] All categories, alphabetically.
#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Category>>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::Categories)?;

    let categories = state.repo.list_categories().await?;
    Ok(Json(categories))
}

/// create_category
///
/// [Staff Route] Creates a named grouping. Duplicate names answer 422.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CategoryPayload,
    responses((status = 200, description = "Created", body = Category))
)]
pub async fn create_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CategoryPayload>,
) -> Result<Json<Category>, ApiError> {
    policy::require(auth.actor(), Action::Create, Collection::Categories)?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("category name is required".into()));
    }

    match state.repo.create_category(&name).await? {
        Some(category) => Ok(Json(category)),
        None => Err(ApiError::Validation(format!(
            "category \"{}\" already exists",
            name
        ))),
    }
}

/// rename_category
///
/// [Staff Route] Renames a category; resources keep their reference.
#[utoipa::path(
    put,
    path = "/categories/{id}",
    request_body = CategoryPayload,
    responses((status = 200, description = "Renamed", body = Category))
)]
pub async fn rename_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryPayload>,
) -> Result<Json<Category>, ApiError> {
    policy::require(auth.actor(), Action::Update, Collection::Categories)?;

    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::Validation("category name is required".into()));
    }

    state
        .repo
        .rename_category(id, &name)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// delete_category
///
/// [Staff Route] Deletes a category. Referencing resources survive with a nulled
/// reference (FK SET NULL) and display as "Uncategorized".
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_category(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    policy::require(auth.actor(), Action::Delete, Collection::Categories)?;

    if state.repo.delete_category(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Analytics Handlers ---

/// analytics_summary
///
/// [Staff Route] Catalog totals and category distribution. The view/download
/// totals sum the denormalized counters, not the event log.
#[utoipa::path(
    get,
    path = "/analytics/summary",
    responses((status = 200, description = "Summary", body = AnalyticsSummary))
)]
pub async fn analytics_summary(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AnalyticsSummary>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::ViewEvents)?;

    let summary = state.repo.analytics_summary().await?;
    Ok(Json(summary))
}

/// analytics_trend
///
/// [Staff Route] View events bucketed per calendar day over the trailing
/// 7-day window, zero-filled.
#[utoipa::path(
    get,
    path = "/analytics/trend",
    responses((status = 200, description = "Daily view counts", body = [DailyViews]))
)]
pub async fn analytics_trend(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<DailyViews>>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::ViewEvents)?;

    let now = Utc::now();
    let since = analytics::trend_window_start(now);
    let timestamps = state.repo.view_timestamps_since(since).await?;
    Ok(Json(analytics::bucket_daily(&timestamps, now)))
}

/// analytics_top
///
/// [Staff Route] Top 5 resources by view count.
#[utoipa::path(
    get,
    path = "/analytics/top",
    responses((status = 200, description = "Top resources", body = [ResourceWithMeta]))
)]
pub async fn analytics_top(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<ResourceWithMeta>>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::ViewEvents)?;

    let top = state.repo.top_resources(5).await?;
    Ok(Json(top))
}

// --- Admin Handlers ---

/// get_users
///
/// [Admin Route] Every profile joined with its role set and owned-resource
/// count, plus role bucket totals. A multi-role principal counts once per bucket.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "User overview", body = AdminUsersResponse))
)]
pub async fn get_users(
    auth: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<AdminUsersResponse>, ApiError> {
    policy::require(auth.actor(), Action::Read, Collection::RoleAssignments)?;

    let users = state.repo.list_users().await?;
    let totals = analytics::role_totals(&users);
    Ok(Json(AdminUsersResponse { users, totals }))
}

/// grant_role
///
/// [Admin Route] Grants a role to a principal. Idempotent at the storage layer
/// (`ON CONFLICT DO NOTHING`); a duplicate grant answers 409.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/roles",
    params(("id" = Uuid, Path, description = "Principal ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 204, description = "Granted"),
        (status = 409, description = "Already assigned")
    )
)]
pub async fn grant_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AssignRoleRequest>,
) -> Result<StatusCode, ApiError> {
    policy::require(auth.actor(), Action::Create, Collection::RoleAssignments)?;

    // The grant target must exist; a bad UUID should not create a floating row.
    state
        .repo
        .get_profile(user_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if state.repo.grant_role(user_id, payload.role).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::Conflict("role already assigned".into()))
    }
}

/// revoke_role
///
/// [Admin Route] Removes a (principal, role) pair. Resources owned by the
/// principal are untouched: edit rights are ownership-based, so a former
/// teacher keeps control of rows they already uploaded.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}/roles/{role}",
    params(
        ("id" = Uuid, Path, description = "Principal ID"),
        ("role" = String, Path, description = "Role name")
    ),
    responses(
        (status = 204, description = "Revoked"),
        (status = 404, description = "Pair not found")
    )
)]
pub async fn revoke_role(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((user_id, role)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    policy::require(auth.actor(), Action::Delete, Collection::RoleAssignments)?;

    let role =
        Role::parse(&role).ok_or_else(|| ApiError::Validation("unknown role name".into()))?;

    if state.repo.revoke_role(user_id, role).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Registration Handler ---

/// register_user
///
/// [Public Route] Handles initial user registration via the external identity
/// provider.
///
/// *Flow*: Calls the provider's signup endpoint, retrieves the canonical user
/// UUID, then creates the mirrored profile row and the default `student` role
/// assignment. This keeps primary keys synchronized between the external auth
/// system and the local schema.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses((status = 200, description = "Registered", body = Profile))
)]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<models::RegisterUserRequest>,
) -> Result<Json<Profile>, ApiError> {
    let provider_url = std::env::var("SUPABASE_URL")
        .map_err(|_| ApiError::Upstream("identity provider URL not configured".into()))?;
    let provider_key = std::env::var("SUPABASE_KEY")
        .map_err(|_| ApiError::Upstream("identity provider key not configured".into()))?;

    // Step 1: Call the external auth provider.
    let client = reqwest::Client::new();
    let auth_url = format!("{}/auth/v1/signup", provider_url);

    let response = client
        .post(auth_url)
        .header("apikey", provider_key)
        .header("Content-Type", "application/json")
        .json(&serde_json::json!({ "email": payload.email, "password": payload.password }))
        .send()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    if !response.status().is_success() {
        // Provider-side rejection (e.g., email already exists, weak password).
        return Err(ApiError::Validation(
            "registration rejected by identity provider".into(),
        ));
    }

    // Step 2: Extract the canonical user ID from the external response.
    let signup = response
        .json::<SignupResponse>()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;

    // Step 3: Provision the local rows: the profile (self-insert) and the
    // default student role assignment.
    let profile = state
        .repo
        .create_profile(signup.id, payload.full_name)
        .await?;
    state.repo.grant_role(profile.id, Role::Student).await?;

    Ok(Json(profile))
}
