use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// ApiError
///
/// The application-wide error taxonomy. Every handler returns `Result<_, ApiError>`,
/// and the `IntoResponse` impl below is the single place where errors are mapped
/// to HTTP statuses and a JSON body.
///
/// The variants deliberately separate the failure classes the API contract cares about:
/// - missing session (401) vs. insufficient role (403),
/// - caller mistakes (422) vs. absent/invisible rows (404),
/// - storage-gateway trouble (502) vs. database trouble (500).
///
/// Row-level denials are *not* reported as `Forbidden`: ownership scoping happens
/// inside repository queries, so a row the caller may not touch surfaces as
/// `NotFound`, indistinguishable from true absence.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid session could be established for the request.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The session is valid but the principal's role set does not permit the operation.
    #[error("insufficient role for this operation")]
    Forbidden,

    /// A caller-supplied field or file failed validation.
    #[error("{0}")]
    Validation(String),

    /// The entity does not exist, or is not visible to the principal.
    #[error("not found")]
    NotFound,

    /// The request conflicts with existing state (e.g., duplicate role grant).
    #[error("{0}")]
    Conflict(String),

    /// The object-storage gateway failed or timed out.
    #[error("storage failure: {0}")]
    Storage(String),

    /// A database query failed for reasons unrelated to the caller.
    #[error("database failure")]
    Database(#[from] sqlx::Error),

    /// An upstream service (e.g., the identity provider) failed.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

/// Wire shape of an error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Storage(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(_) | ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Server-side failures get logged with their cause; the client only sees
        // a generic message so no internals leak.
        let message = match &self {
            ApiError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                "internal error".to_string()
            }
            ApiError::Storage(e) => {
                tracing::error!("storage error: {}", e);
                "storage unavailable".to_string()
            }
            ApiError::Upstream(e) => {
                tracing::error!("upstream error: {}", e);
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
