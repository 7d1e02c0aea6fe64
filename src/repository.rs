use crate::analytics;
use crate::models::{
    AnalyticsSummary, Category, NewResource, Profile, Resource, ResourceWithMeta, Role,
    UpdateProfileRequest, UpdateResourceRequest, UserOverview,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// Defines the abstract contract for all persistence operations, allowing the
/// handlers to interact with the data layer without knowing the specific
/// implementation (Postgres, Mock, etc.).
///
/// Row-level authorization lives here: operations that the policy table scopes
/// by ownership take the requester's identity and compile the ownership check
/// into the WHERE clause, so a denied row and a missing row both surface as
/// "nothing happened" (None / false). Role-level gates stay in the handlers
/// via the policy module.
///
/// **Send + Sync + async_trait** are required to make the trait object
/// (`Arc<dyn Repository>`) safely shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error>;
    // Idempotent self-insert used at registration / first sign-in.
    async fn create_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
    ) -> Result<Profile, sqlx::Error>;
    // Owner-only partial update; scoping is the id itself.
    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<Profile>, sqlx::Error>;

    // --- Role Store ---
    // Loads the full role set for the auth extractor. This is the trusted
    // internal path: it is called before any policy evaluation and never
    // passes through the policy layer itself.
    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error>;
    // Idempotent grant: returns false when the pair already existed.
    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error>;
    async fn revoke_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error>;

    // --- Categories ---
    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error>;
    // Returns None when the name is already taken.
    async fn create_category(&self, name: &str) -> Result<Option<Category>, sqlx::Error>;
    async fn rename_category(&self, id: Uuid, name: &str)
    -> Result<Option<Category>, sqlx::Error>;
    // Referencing resources survive with a nulled category (FK SET NULL).
    async fn delete_category(&self, id: Uuid) -> Result<bool, sqlx::Error>;

    // --- Resource Catalog ---
    // Listing with search/category filters; display names resolved in one joined query.
    async fn list_resources(
        &self,
        search: Option<String>,
        category: Option<String>,
    ) -> Result<Vec<ResourceWithMeta>, sqlx::Error>;
    async fn get_resource(&self, id: Uuid) -> Result<Option<ResourceWithMeta>, sqlx::Error>;
    async fn create_resource(&self, new: NewResource) -> Result<Resource, sqlx::Error>;
    // Owner-or-admin: `admin_override` widens the WHERE clause instead of skipping it.
    async fn update_resource(
        &self,
        id: Uuid,
        requester: Uuid,
        admin_override: bool,
        req: UpdateResourceRequest,
    ) -> Result<Option<Resource>, sqlx::Error>;
    // Returns the stored object's URL so the caller can log the orphan.
    async fn delete_resource(
        &self,
        id: Uuid,
        requester: Uuid,
        admin_override: bool,
    ) -> Result<Option<String>, sqlx::Error>;

    // --- Usage Recorder ---
    // Event insert + atomic counter increment in one transaction. Returns false
    // when the resource does not exist.
    async fn record_view(
        &self,
        resource_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error>;
    async fn record_download(&self, resource_id: Uuid) -> Result<bool, sqlx::Error>;

    // --- Analytics Aggregator (pure reads) ---
    async fn analytics_summary(&self) -> Result<AnalyticsSummary, sqlx::Error>;
    // Raw event timestamps within the window; calendar bucketing happens in
    // the analytics module.
    async fn view_timestamps_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, sqlx::Error>;
    async fn top_resources(&self, limit: i64) -> Result<Vec<ResourceWithMeta>, sqlx::Error>;

    // --- Admin Overview ---
    // Every profile joined with its role set and owned-resource count, in a
    // single grouped query rather than per-row lookups.
    async fn list_users(&self) -> Result<Vec<UserOverview>, sqlx::Error>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const RESOURCE_WITH_META_SELECT: &str = r#"
    SELECT r.id, r.title, r.description, r.category_id, r.file_url, r.file_type,
           r.file_size, r.uploaded_by, r.view_count, r.download_count,
           r.created_at, r.updated_at,
           c.name AS category_name, p.full_name AS uploader_name
    FROM resources r
    LEFT JOIN categories c ON r.category_id = c.id
    LEFT JOIN profiles p ON r.uploaded_by = p.id
"#;

#[async_trait]
impl Repository for PostgresRepository {
    // --- PROFILES ---

    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            "SELECT id, full_name, avatar_url, created_at FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Upsert keyed on the identity provider's UUID. Re-registration of an
    /// existing principal is a no-op apart from filling in a missing name.
    async fn create_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
    ) -> Result<Profile, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, full_name)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE
                SET full_name = COALESCE(profiles.full_name, EXCLUDED.full_name)
            RETURNING id, full_name, avatar_url, created_at
            "#,
        )
        .bind(id)
        .bind(full_name)
        .fetch_one(&self.pool)
        .await
    }

    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($2, full_name),
                avatar_url = COALESCE($3, avatar_url)
            WHERE id = $1
            RETURNING id, full_name, avatar_url, created_at
            "#,
        )
        .bind(id)
        .bind(req.full_name)
        .bind(req.avatar_url)
        .fetch_optional(&self.pool)
        .await
    }

    // --- ROLE STORE ---

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        // Unknown role strings are skipped rather than failing the lookup.
        Ok(rows.iter().filter_map(|r| Role::parse(r)).collect())
    }

    /// Uses `ON CONFLICT DO NOTHING` on the (user, role) pair for idempotency.
    /// Returns true only if a new row was inserted.
    async fn grant_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_role(&self, user_id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role = $2")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- CATEGORIES ---

    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories ORDER BY name")
            .fetch_all(&self.pool)
            .await
    }

    /// Duplicate names are folded into `Ok(None)` so the handler can answer
    /// with a validation error instead of a 500.
    async fn create_category(&self, name: &str) -> Result<Option<Category>, sqlx::Error> {
        let result = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name) VALUES ($1, $2) RETURNING id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(category) => Ok(Some(category)),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rename_category(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Category>, sqlx::Error> {
        let result = sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2 WHERE id = $1 RETURNING id, name, created_at",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await;

        match result {
            Ok(category) => Ok(category),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete_category(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- RESOURCE CATALOG ---

    /// Implements flexible search/filtering using QueryBuilder for safe
    /// parameterization. The text filter matches title OR description
    /// case-insensitively; the category filter matches the resolved name.
    /// Display names come from the LEFT JOINs, one query for the whole page.
    async fn list_resources(
        &self,
        search: Option<String>,
        category: Option<String>,
    ) -> Result<Vec<ResourceWithMeta>, sqlx::Error> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(RESOURCE_WITH_META_SELECT);
        builder.push(" WHERE 1 = 1 ");

        if let Some(s) = search {
            let pattern = format!("%{}%", s);
            builder.push(" AND (r.title ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR r.description ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }

        if let Some(name) = category {
            builder.push(" AND c.name = ");
            builder.push_bind(name);
        }

        builder.push(" ORDER BY r.created_at DESC");

        builder
            .build_query_as::<ResourceWithMeta>()
            .fetch_all(&self.pool)
            .await
    }

    async fn get_resource(&self, id: Uuid) -> Result<Option<ResourceWithMeta>, sqlx::Error> {
        let query = format!("{} WHERE r.id = $1", RESOURCE_WITH_META_SELECT);
        sqlx::query_as::<_, ResourceWithMeta>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Inserts a new catalog row with zeroed counters. The object is already in
    /// storage at this point; a failure here orphans it (logged by the caller).
    async fn create_resource(&self, new: NewResource) -> Result<Resource, sqlx::Error> {
        sqlx::query_as::<_, Resource>(
            r#"
            INSERT INTO resources
                (id, title, description, category_id, file_url, file_type,
                 file_size, uploaded_by, view_count, download_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, NOW(), NOW())
            RETURNING id, title, description, category_id, file_url, file_type,
                      file_size, uploaded_by, view_count, download_count,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.title)
        .bind(new.description)
        .bind(new.category_id)
        .bind(new.file_url)
        .bind(new.file_type)
        .bind(new.file_size)
        .bind(new.uploaded_by)
        .fetch_one(&self.pool)
        .await
    }

    /// Partial update via COALESCE. The WHERE clause carries the ownership
    /// check; `admin_override` widens it so admins can edit any row.
    async fn update_resource(
        &self,
        id: Uuid,
        requester: Uuid,
        admin_override: bool,
        req: UpdateResourceRequest,
    ) -> Result<Option<Resource>, sqlx::Error> {
        sqlx::query_as::<_, Resource>(
            r#"
            UPDATE resources
            SET title = COALESCE($4, title),
                description = COALESCE($5, description),
                category_id = COALESCE($6, category_id),
                updated_at = NOW()
            WHERE id = $1 AND (uploaded_by = $2 OR $3)
            RETURNING id, title, description, category_id, file_url, file_type,
                      file_size, uploaded_by, view_count, download_count,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(requester)
        .bind(admin_override)
        .bind(req.title)
        .bind(req.description)
        .bind(req.category_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Deletes the catalog row only; the stored object is not touched. Returns
    /// the object URL so the caller can record the orphan.
    async fn delete_resource(
        &self,
        id: Uuid,
        requester: Uuid,
        admin_override: bool,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "DELETE FROM resources WHERE id = $1 AND (uploaded_by = $2 OR $3) RETURNING file_url",
        )
        .bind(id)
        .bind(requester)
        .bind(admin_override)
        .fetch_optional(&self.pool)
        .await
    }

    // --- USAGE RECORDER ---

    /// The counter increment is a single atomic UPDATE, never read-then-write,
    /// so N concurrent views raise the counter by exactly N. The event insert
    /// shares the transaction: the log and the counter commit or roll back
    /// together and cannot drift through partial failure.
    async fn record_view(
        &self,
        resource_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let updated =
            sqlx::query("UPDATE resources SET view_count = view_count + 1 WHERE id = $1")
                .bind(resource_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("INSERT INTO resource_views (resource_id, user_id) VALUES ($1, $2)")
            .bind(resource_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Downloads have no event log; a lone atomic increment suffices.
    async fn record_download(&self, resource_id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE resources SET download_count = download_count + 1 WHERE id = $1")
                .bind(resource_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    // --- ANALYTICS AGGREGATOR ---

    /// Full re-scan at query time; acceptable at this catalog's scale. The
    /// view/download totals sum the denormalized counters, not the event log.
    async fn analytics_summary(&self) -> Result<AnalyticsSummary, sqlx::Error> {
        let total_resources =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM resources")
                .fetch_one(&self.pool)
                .await?;

        let (total_views, total_downloads) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COALESCE(SUM(view_count), 0)::bigint,
                   COALESCE(SUM(download_count), 0)::bigint
            FROM resources
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        // Grouped on the nullable name so the no-category bucket stays its
        // own group; the display label is applied in Rust and cannot absorb
        // a real category that happens to be named "Uncategorized".
        let category_rows = sqlx::query_as::<_, (Option<String>, i64)>(
            r#"
            SELECT c.name, COUNT(*)::bigint AS count
            FROM resources r
            LEFT JOIN categories c ON r.category_id = c.id
            GROUP BY c.name
            ORDER BY count DESC, c.name ASC NULLS LAST
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalyticsSummary {
            total_resources,
            total_views,
            total_downloads,
            category_distribution: analytics::category_distribution(category_rows),
        })
    }

    async fn view_timestamps_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
        sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT viewed_at FROM resource_views WHERE viewed_at >= $1 ORDER BY viewed_at",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
    }

    async fn top_resources(&self, limit: i64) -> Result<Vec<ResourceWithMeta>, sqlx::Error> {
        let query = format!(
            "{} ORDER BY r.view_count DESC, r.created_at DESC LIMIT $1",
            RESOURCE_WITH_META_SELECT
        );
        sqlx::query_as::<_, ResourceWithMeta>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
    }

    // --- ADMIN OVERVIEW ---

    /// One grouped query for the whole listing instead of a role lookup and a
    /// resource count per profile.
    async fn list_users(&self) -> Result<Vec<UserOverview>, sqlx::Error> {
        sqlx::query_as::<_, UserOverview>(
            r#"
            SELECT p.id, p.full_name, p.avatar_url, p.created_at,
                   COALESCE(
                       array_agg(ur.role ORDER BY ur.role)
                           FILTER (WHERE ur.role IS NOT NULL),
                       '{}'
                   ) AS roles,
                   (SELECT COUNT(*) FROM resources r WHERE r.uploaded_by = p.id)::bigint
                       AS resource_count
            FROM profiles p
            LEFT JOIN user_roles ur ON ur.user_id = p.id
            GROUP BY p.id, p.full_name, p.avatar_url, p.created_at
            ORDER BY p.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
