use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learnhub::{
    AppConfig, AppState, MockStorageService, create_router,
    models::{
        AdminUsersResponse, AnalyticsSummary, Category, NewResource, Profile, Resource,
        ResourceWithMeta, Role, UpdateProfileRequest, UpdateResourceRequest, UserOverview,
    },
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

// --- IN-MEMORY REPOSITORY ---

// Backs the spawned app with known principals instead of a live database.
// Auth resolves through get_profile + roles_for_user, so seeding this map is
// all the local x-user-id bypass needs.
struct SeededRepo {
    principals: HashMap<Uuid, Vec<Role>>,
}

impl SeededRepo {
    fn new(principals: Vec<(Uuid, Vec<Role>)>) -> Self {
        Self {
            principals: principals.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Repository for SeededRepo {
    async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
        Ok(self.principals.contains_key(&id).then(|| Profile {
            id,
            ..Profile::default()
        }))
    }
    async fn create_profile(
        &self,
        id: Uuid,
        full_name: Option<String>,
    ) -> Result<Profile, sqlx::Error> {
        Ok(Profile {
            id,
            full_name,
            ..Profile::default()
        })
    }
    async fn update_profile(
        &self,
        id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<Option<Profile>, sqlx::Error> {
        Ok(Some(Profile {
            id,
            full_name: req.full_name,
            avatar_url: req.avatar_url,
            ..Profile::default()
        }))
    }

    async fn roles_for_user(&self, user_id: Uuid) -> Result<Vec<Role>, sqlx::Error> {
        Ok(self.principals.get(&user_id).cloned().unwrap_or_default())
    }
    async fn grant_role(&self, _user_id: Uuid, _role: Role) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
    async fn revoke_role(&self, _user_id: Uuid, _role: Role) -> Result<bool, sqlx::Error> {
        Ok(true)
    }

    async fn list_categories(&self) -> Result<Vec<Category>, sqlx::Error> {
        Ok(vec![])
    }
    async fn create_category(&self, name: &str) -> Result<Option<Category>, sqlx::Error> {
        Ok(Some(Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ..Category::default()
        }))
    }
    async fn rename_category(
        &self,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Category>, sqlx::Error> {
        Ok(Some(Category {
            id,
            name: name.to_string(),
            ..Category::default()
        }))
    }
    async fn delete_category(&self, _id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(true)
    }

    async fn list_resources(
        &self,
        _search: Option<String>,
        _category: Option<String>,
    ) -> Result<Vec<ResourceWithMeta>, sqlx::Error> {
        Ok(vec![])
    }
    async fn get_resource(&self, _id: Uuid) -> Result<Option<ResourceWithMeta>, sqlx::Error> {
        Ok(None)
    }
    async fn create_resource(&self, new: NewResource) -> Result<Resource, sqlx::Error> {
        Ok(Resource {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            category_id: new.category_id,
            file_url: new.file_url,
            file_type: new.file_type,
            file_size: new.file_size,
            uploaded_by: new.uploaded_by,
            ..Resource::default()
        })
    }
    async fn update_resource(
        &self,
        _id: Uuid,
        _requester: Uuid,
        _admin_override: bool,
        _req: UpdateResourceRequest,
    ) -> Result<Option<Resource>, sqlx::Error> {
        Ok(None)
    }
    async fn delete_resource(
        &self,
        _id: Uuid,
        _requester: Uuid,
        _admin_override: bool,
    ) -> Result<Option<String>, sqlx::Error> {
        Ok(None)
    }

    async fn record_view(
        &self,
        _resource_id: Uuid,
        _user_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        Ok(true)
    }
    async fn record_download(&self, _resource_id: Uuid) -> Result<bool, sqlx::Error> {
        Ok(true)
    }

    async fn analytics_summary(&self) -> Result<AnalyticsSummary, sqlx::Error> {
        Ok(AnalyticsSummary::default())
    }
    async fn view_timestamps_since(
        &self,
        _since: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
        Ok(vec![])
    }
    async fn top_resources(&self, _limit: i64) -> Result<Vec<ResourceWithMeta>, sqlx::Error> {
        Ok(vec![])
    }

    async fn list_users(&self) -> Result<Vec<UserOverview>, sqlx::Error> {
        Ok(vec![])
    }
}

// --- TEST APP ---

const STUDENT_ID: Uuid = Uuid::from_u128(1);
const TEACHER_ID: Uuid = Uuid::from_u128(2);
const ADMIN_ID: Uuid = Uuid::from_u128(3);

pub struct TestApp {
    pub address: String,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(SeededRepo::new(vec![
        (STUDENT_ID, vec![Role::Student]),
        (TEACHER_ID, vec![Role::Teacher]),
        (ADMIN_ID, vec![Role::Admin]),
    ])) as RepositoryState;
    let storage = Arc::new(MockStorageService::new()) as StorageState;
    // Default config runs Env::Local, which enables the x-user-id bypass.
    let config = AppConfig::default();

    let state = AppState {
        repo,
        storage,
        config,
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address }
}

fn multipart_upload(title: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().text("title", title.to_string()).part(
        "file",
        reqwest::multipart::Part::bytes(b"%PDF-1.4 fake".to_vec())
            .file_name("notes.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    )
}

// --- TESTS ---

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/health", app.address))
        .send()
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    for path in ["/me", "/resources", "/categories", "/analytics/summary"] {
        let response = client
            .get(format!("{}{}", app.address, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 401, "GET {} without a session", path);
    }

    // An unknown principal id is an invalid session, not an empty one.
    let response = client
        .get(format!("{}/me", app.address))
        .header("x-user-id", Uuid::new_v4().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn test_student_can_browse_catalog() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/resources?search=calculus", app.address))
        .header("x-user-id", STUDENT_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let list: Vec<ResourceWithMeta> = response.json().await.unwrap();
    assert!(list.is_empty());
}

#[tokio::test]
async fn test_student_cannot_upload() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/resources", app.address))
        .header("x-user-id", STUDENT_ID.to_string())
        .multipart(multipart_upload("Student Notes"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_teacher_upload_creates_resource() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/resources", app.address))
        .header("x-user-id", TEACHER_ID.to_string())
        .multipart(multipart_upload("Lecture 1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let resource: Resource = response.json().await.unwrap();
    assert_eq!(resource.title, "Lecture 1");
    assert_eq!(resource.file_type, "pdf");
    assert_eq!(resource.uploaded_by, TEACHER_ID);
    // The URL comes from storage, keyed under the uploader's namespace.
    assert!(resource.file_url.contains(&format!("uploads/{}/", TEACHER_ID)));
    assert!(resource.file_url.ends_with(".pdf"));
}

#[tokio::test]
async fn test_upload_accepts_video_sized_bodies() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    // Larger than the 2 MiB framework default; must pass the widened limit
    // on the upload route.
    let form = reqwest::multipart::Form::new()
        .text("title", "Lecture Recording")
        .part(
            "file",
            reqwest::multipart::Part::bytes(vec![0u8; 3 * 1024 * 1024])
                .file_name("lecture.mp4")
                .mime_str("video/mp4")
                .unwrap(),
        );

    let response = client
        .post(format!("{}/resources", app.address))
        .header("x-user-id", TEACHER_ID.to_string())
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let resource: Resource = response.json().await.unwrap();
    assert_eq!(resource.file_type, "video");
    assert_eq!(resource.file_size, 3 * 1024 * 1024);
}

#[tokio::test]
async fn test_upload_without_title_is_unprocessable() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(b"data".to_vec())
            .file_name("notes.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );

    let response = client
        .post(format!("{}/resources", app.address))
        .header("x-user-id", TEACHER_ID.to_string())
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_record_view_returns_no_content() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/resources/{}/view", app.address, Uuid::new_v4()))
        .header("x-user-id", STUDENT_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_analytics_gated_to_staff() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/analytics/summary", app.address))
        .header("x-user-id", STUDENT_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .get(format!("{}/analytics/summary", app.address))
        .header("x-user-id", TEACHER_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let summary: AnalyticsSummary = response.json().await.unwrap();
    assert_eq!(summary.total_resources, 0);
}

#[tokio::test]
async fn test_admin_routes_gated_to_admins() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/admin/users", app.address))
        .header("x-user-id", TEACHER_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = client
        .get(format!("{}/admin/users", app.address))
        .header("x-user-id", ADMIN_ID.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let overview: AdminUsersResponse = response.json().await.unwrap();
    assert_eq!(overview.totals.students, 0);
}
