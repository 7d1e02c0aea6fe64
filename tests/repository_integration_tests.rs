use learnhub::{
    models::{NewResource, Role, UpdateResourceRequest},
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    /// Connects and migrates when DATABASE_URL is configured; returns None
    /// otherwise so the suite stays green on machines without Postgres.
    async fn setup() -> Option<Self> {
        dotenv::dotenv().ok();

        let db_url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("DATABASE_URL not set; skipping database integration test");
                return None;
            }
        };

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        Some(DbTestContext { pool })
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Inserts a fresh profile row and returns its id.
async fn create_test_profile(repo: &PostgresRepository, name: &str) -> Uuid {
    let id = Uuid::new_v4();
    let profile = repo
        .create_profile(id, Some(name.to_string()))
        .await
        .expect("Failed to create test profile");
    profile.id
}

/// Inserts a catalog row owned by `owner` and returns it.
async fn create_test_resource(
    repo: &PostgresRepository,
    owner: Uuid,
    title: &str,
    category_id: Option<Uuid>,
) -> learnhub::models::Resource {
    repo.create_resource(NewResource {
        title: title.to_string(),
        description: Some("integration fixture".to_string()),
        category_id,
        file_url: format!("http://localhost:9000/learnhub-test/uploads/{}/x.pdf", owner),
        file_type: "pdf".to_string(),
        file_size: 1024,
        uploaded_by: owner,
    })
    .await
    .expect("Failed to create test resource")
}

/// Unique category name so parallel test runs cannot collide on the
/// UNIQUE constraint.
fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

// --- Tests ---

#[test]
async fn test_role_grant_is_idempotent_and_cascades_with_profile() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let user = create_test_profile(&repo, "Role Lifecycle").await;

    // First grant inserts, second is a no-op.
    assert!(repo.grant_role(user, Role::Teacher).await.unwrap());
    assert!(!repo.grant_role(user, Role::Teacher).await.unwrap());
    assert_eq!(repo.roles_for_user(user).await.unwrap(), vec![Role::Teacher]);

    // Revoking an absent pair reports false.
    assert!(repo.revoke_role(user, Role::Teacher).await.unwrap());
    assert!(!repo.revoke_role(user, Role::Teacher).await.unwrap());

    // Deleting the profile takes its remaining assignments with it.
    repo.grant_role(user, Role::Student).await.unwrap();
    sqlx::query("DELETE FROM profiles WHERE id = $1")
        .bind(user)
        .execute(&ctx.pool)
        .await
        .unwrap();
    assert!(repo.roles_for_user(user).await.unwrap().is_empty());
}

#[test]
async fn test_concurrent_views_increment_by_exactly_n() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = Arc::new(ctx.repository());
    let user = create_test_profile(&repo, "Concurrent Viewer").await;
    let resource = create_test_resource(&repo, user, "Contended Lecture", None).await;

    const N: usize = 20;
    let mut handles = Vec::with_capacity(N);
    for _ in 0..N {
        let repo = repo.clone();
        let id = resource.id;
        handles.push(tokio::spawn(async move {
            repo.record_view(id, Some(user)).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    // The atomic in-place increments must not lose any of the N updates,
    // and the event log must agree with the counter.
    let fetched = repo.get_resource(resource.id).await.unwrap().unwrap();
    assert_eq!(fetched.view_count, N as i64);

    let events: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM resource_views WHERE resource_id = $1")
            .bind(resource.id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(events, N as i64);
}

#[test]
async fn test_record_view_on_missing_resource_changes_nothing() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();

    let ghost = Uuid::new_v4();
    assert!(!repo.record_view(ghost, None).await.unwrap());

    let events: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM resource_views WHERE resource_id = $1")
            .bind(ghost)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(events, 0, "the rolled-back transaction must not log an event");
}

#[test]
async fn test_delete_category_nulls_resource_references() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let user = create_test_profile(&repo, "Category Owner").await;

    let category = repo
        .create_category(&unique_name("doomed"))
        .await
        .unwrap()
        .expect("fresh category name must insert");
    let resource = create_test_resource(&repo, user, "Orphaned Lecture", Some(category.id)).await;

    assert!(repo.delete_category(category.id).await.unwrap());

    // The resource survives with a nulled reference, not a cascade delete.
    let fetched = repo.get_resource(resource.id).await.unwrap().unwrap();
    assert_eq!(fetched.category_id, None);
    assert_eq!(fetched.category_name, None);
}

#[test]
async fn test_duplicate_category_name_is_folded_to_none() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();

    let name = unique_name("dup");
    assert!(repo.create_category(&name).await.unwrap().is_some());
    assert!(repo.create_category(&name).await.unwrap().is_none());
}

#[test]
async fn test_resource_update_scoped_to_owner_or_admin() {
    let Some(ctx) = DbTestContext::setup().await else {
        return;
    };
    let repo = ctx.repository();
    let owner = create_test_profile(&repo, "Uploader").await;
    let stranger = create_test_profile(&repo, "Stranger").await;
    let resource = create_test_resource(&repo, owner, "Guarded Lecture", None).await;

    let rename = UpdateResourceRequest {
        title: Some("Renamed Lecture".to_string()),
        ..UpdateResourceRequest::default()
    };

    // A non-owner without the admin override touches nothing.
    let denied = repo
        .update_resource(resource.id, stranger, false, rename.clone())
        .await
        .unwrap();
    assert!(denied.is_none());

    // The same principal with the admin override succeeds.
    let updated = repo
        .update_resource(resource.id, stranger, true, rename)
        .await
        .unwrap()
        .expect("admin override must widen the scope");
    assert_eq!(updated.title, "Renamed Lecture");

    // Deletion follows the same scoping and reports the orphaned URL.
    assert!(
        repo.delete_resource(resource.id, stranger, false)
            .await
            .unwrap()
            .is_none()
    );
    let orphan = repo
        .delete_resource(resource.id, owner, false)
        .await
        .unwrap()
        .expect("owner delete must succeed");
    assert_eq!(orphan, resource.file_url);
}
