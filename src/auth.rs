use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::ApiError,
    models::Role,
    policy::Actor,
    repository::RepositoryState,
};

/// Claims
///
/// Represents the standard payload structure expected inside a JSON Web Token (JWT).
/// These claims are signed by the identity provider's secret and validated upon
/// every authenticated request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): The UUID of the principal. This is the primary key used to
    /// fetch the profile and role set from the local tables.
    pub sub: Uuid,
    /// Expiration Time (exp): Timestamp after which the JWT must not be accepted.
    pub exp: usize,
    /// Issued At (iat): Timestamp when the JWT was issued.
    pub iat: usize,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: the principal's UUID plus
/// its full role set, loaded once per request. Handlers build policy `Actor`s
/// from this struct; no further role lookups happen downstream.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    /// All roles held by the principal. May be empty: a registered user with no
    /// grants is still authenticated, just limited to student-free operations.
    pub roles: Vec<Role>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }

    /// Teacher or admin: the tier allowed to upload and see analytics.
    pub fn is_staff(&self) -> bool {
        self.roles.contains(&Role::Teacher) || self.is_admin()
    }

    /// Policy actor for operations where row ownership is irrelevant.
    pub fn actor(&self) -> Actor<'_> {
        self.actor_owning(false)
    }

    /// Policy actor with an explicit ownership answer for the row under evaluation.
    pub fn actor_owning(&self, owns_row: bool) -> Actor<'_> {
        Actor::Authenticated {
            roles: &self.roles,
            owns_row,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Implements Axum's FromRequestParts trait, making AuthUser usable as a function
/// argument in any authenticated handler. This cleanly separates authentication
/// (extractor) from authorization (policy module) and business logic (handlers).
///
/// The process:
/// 1. Dependency Resolution: Repository and AppConfig from the application state.
/// 2. Local Bypass: development-time access using the 'x-user-id' header.
/// 3. Token Validation: standard Bearer token extraction and JWT decoding.
/// 4. DB Lookup: profile existence plus the current role set, via the repository's
///    trusted internal path (never through the policy layer).
///
/// Rejection: `ApiError::AuthenticationRequired` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // Local Development Bypass
        // In Env::Local a known profile UUID in the 'x-user-id' header stands in
        // for a signed token. Guarded by the Env check so it is unreachable in
        // production builds of the configuration.
        if config.env == Env::Local {
            if let Some(user_id_header) = parts.headers.get("x-user-id") {
                if let Ok(id_str) = user_id_header.to_str() {
                    if let Ok(user_id) = Uuid::parse_str(id_str) {
                        // The UUID must map to an actual profile so the role set
                        // is loaded from real rows.
                        if let Ok(Some(profile)) = repo.get_profile(user_id).await {
                            let roles = repo
                                .roles_for_user(profile.id)
                                .await
                                .map_err(|_| ApiError::AuthenticationRequired)?;
                            return Ok(AuthUser {
                                id: profile.id,
                                roles,
                            });
                        }
                    }
                }
            }
        }
        // Fall through to standard JWT validation.

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::AuthenticationRequired)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::AuthenticationRequired)?;

        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        let mut validation = Validation::default();
        validation.validate_exp = true;

        // Expired, malformed and bad-signature tokens all collapse to 401; the
        // distinction is logged upstream but never leaked to the client.
        let token_data = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(|_| ApiError::AuthenticationRequired)?;

        let user_id = token_data.claims.sub;

        // Final verification: the token may be valid while the principal has
        // been deleted since issuance.
        let profile = repo
            .get_profile(user_id)
            .await
            .map_err(|_| ApiError::AuthenticationRequired)?
            .ok_or(ApiError::AuthenticationRequired)?;

        let roles = repo
            .roles_for_user(profile.id)
            .await
            .map_err(|_| ApiError::AuthenticationRequired)?;

        Ok(AuthUser {
            id: profile.id,
            roles,
        })
    }
}
