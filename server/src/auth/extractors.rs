//! Axum extractors for authenticated principals.
//!
//! ```rust,ignore
//! async fn my_tickets(user: AuthUser) -> AppResult<Response> { ... }
//!
//! async fn create_movie(admin: AuthAdmin) -> AppResult<Response> {
//!     admin.authorize(&AdminRole::CATALOG)?;
//!     ...
//! }
//! ```

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::auth::jwt::{Claims, PrincipalKind};
use crate::models::{Admin, AdminRole, User};
use crate::state::AppState;
use crate::utils::AppError;

/// Token from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::AuthError("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::AuthError(
                    "Invalid authorization format. Expected 'Bearer <token>'".to_string(),
                )
            })?;

        Ok(Self(token.to_string()))
    }
}

async fn claims_of(
    parts: &mut Parts,
    state: &AppState,
    kind: PrincipalKind,
) -> Result<Claims, AppError> {
    let BearerToken(token) = BearerToken::from_request_parts(parts, state).await?;
    let claims = state.tokens.verify(&token)?;
    if claims.kind != kind {
        return Err(AppError::Forbidden(
            "Token is not valid for this resource".to_string(),
        ));
    }
    Ok(claims)
}

/// A signed-in user that still exists.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_of(parts, state, PrincipalKind::User).await?;
        let user = state
            .store
            .find_user(claims.subject()?)
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;
        Ok(Self(user))
    }
}

/// A signed-in admin that still exists. The role is read from the store,
/// not from the token.
#[derive(Debug, Clone)]
pub struct AuthAdmin(pub Admin);

impl AuthAdmin {
    /// Allows the request only for one of `roles`.
    pub fn authorize(&self, roles: &[AdminRole]) -> Result<(), AppError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Insufficient role for this operation".to_string(),
            ))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = claims_of(parts, state, PrincipalKind::Admin).await?;
        let admin = state
            .store
            .find_admin(claims.subject()?)
            .await?
            .ok_or_else(|| AppError::AuthError("Admin no longer exists".to_string()))?;
        Ok(Self(admin))
    }
}

/// `None` without an Authorization header; a present but bad token is
/// still rejected.
#[derive(Debug, Clone)]
pub struct OptionalAdmin(pub Option<AuthAdmin>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key("authorization") {
            return Ok(Self(None));
        }
        let admin = AuthAdmin::from_request_parts(parts, state).await?;
        Ok(Self(Some(admin)))
    }
}
