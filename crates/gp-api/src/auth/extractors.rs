//! Axum extractors for authentication and role checks.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use gp_core::auth::{Role, User};
use gp_core::db::create_user_repository;
use tracing::warn;

use super::bearer_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Extractor for authenticated users.
///
/// Verifies the bearer token, then loads the user from the database so
/// role changes and account disabling take effect immediately rather
/// than at token expiry.
pub struct AuthenticatedUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

        let claims = app_state.auth.verify(token)?;

        let user_repo = create_user_repository(&app_state.db);
        let user = match user_repo.get(claims.sub).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id = %claims.sub, "Token for a user that no longer exists");
                return Err(ApiError::Unauthorized("Unknown user".to_string()));
            }
            Err(e) => {
                warn!(error = %e, "Database error loading authenticated user");
                return Err(ApiError::Database(e.to_string()));
            }
        };

        if !user.enabled {
            return Err(ApiError::AccountDisabled);
        }

        Ok(AuthenticatedUser(user))
    }
}

/// Extractor that requires the admin role.
pub struct RequireAdmin(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.covers(Role::Admin) {
            return Err(ApiError::Forbidden("Admin access required".to_string()));
        }

        Ok(RequireAdmin(user))
    }
}

/// Extractor that requires at least the cashier role.
pub struct RequireCashier(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for RequireCashier
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthenticatedUser(user) = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !user.covers(Role::Cashier) {
            return Err(ApiError::Forbidden("Cashier access required".to_string()));
        }

        Ok(RequireCashier(user))
    }
}
