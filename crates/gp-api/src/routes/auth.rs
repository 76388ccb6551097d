//! Authentication routes: login, current user, password change.

use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::create_user_repository;
use gp_core::{hash_password, validate_password_strength, verify_password};
use gp_observability::metrics::names;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/me", get(me))
        .route("/password", post(change_password))
}

/// Login request.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    /// Username or email.
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Login response: bearer token plus the authenticated user.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in_seconds: i64,
    pub user: CurrentUserResponse,
}

/// The authenticated user, without sensitive fields.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CurrentUserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub display_name: Option<String>,
}

impl From<gp_core::User> for CurrentUserResponse {
    fn from(user: gp_core::User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.as_str().to_string(),
            display_name: user.display_name,
        }
    }
}

/// Request to change the caller's own password.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Exchanges credentials for a bearer token.
async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    request.validate()?;

    let client_ip = addr.ip();
    if state.login_rate_limiter.check(client_ip).is_err() {
        warn!(ip = %client_ip, username = %request.username, "Login rate limited");
        metrics::counter!(names::LOGIN_FAILURES).increment(1);
        return Err(ApiError::RateLimited);
    }

    let user_repo = create_user_repository(&state.db);

    // The login field accepts either the username or the email.
    let user = match user_repo.get_by_username(&request.username).await? {
        Some(user) => Some(user),
        None => user_repo.get_by_email(&request.username).await?,
    };

    let Some(user) = user else {
        warn!(ip = %client_ip, username = %request.username, "Login for unknown user");
        metrics::counter!(names::LOGIN_FAILURES).increment(1);
        return Err(ApiError::InvalidCredentials);
    };

    if !user.enabled {
        warn!(ip = %client_ip, username = %user.username, "Login for disabled account");
        return Err(ApiError::AccountDisabled);
    }

    let valid = verify_password(&request.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {e}")))?;
    if !valid {
        warn!(ip = %client_ip, username = %user.username, "Wrong password");
        metrics::counter!(names::LOGIN_FAILURES).increment(1);
        return Err(ApiError::InvalidCredentials);
    }

    user_repo.update_last_login(user.id).await?;
    let token = state.auth.issue(&user)?;

    info!(username = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        token,
        expires_in_seconds: state.auth.ttl_seconds(),
        user: user.into(),
    }))
}

/// Returns the authenticated user.
async fn me(AuthenticatedUser(user): AuthenticatedUser) -> Json<CurrentUserResponse> {
    Json(user.into())
}

/// Changes the caller's own password.
async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    request.validate()?;

    let valid = verify_password(&request.current_password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("Password verification failed: {e}")))?;
    if !valid {
        return Err(ApiError::validation_field(
            "current_password",
            "Current password is incorrect",
        ));
    }

    let strength_errors = validate_password_strength(&request.new_password);
    if !strength_errors.is_empty() {
        return Err(ApiError::validation_field(
            "new_password",
            &strength_errors.join("; "),
        ));
    }

    let password_hash = hash_password(&request.new_password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;

    create_user_repository(&state.db)
        .update_password(user.id, &password_hash)
        .await?;

    info!(username = %user.username, "Password changed");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api_with_connect_info, body_json, seeded_user, test_state};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use gp_core::Role;
    use tower::ServiceExt;

    #[tokio::test]
    async fn login_round_trip() {
        let state = test_state().await;
        let (_, _) = seeded_user(&state, "kassir1", Role::Cashier).await;
        let app = api_with_connect_info(state.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"username": "kassir1", "password": "Password1"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let login: LoginResponse = body_json(response).await;
        assert_eq!(login.user.username, "kassir1");
        assert!(login.expires_in_seconds > 0);

        // The issued token authenticates /me
        let me = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {}", login.token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(me.status(), StatusCode::OK);
        let current: CurrentUserResponse = body_json(me).await;
        assert_eq!(current.username, "kassir1");
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = test_state().await;
        seeded_user(&state, "kassir1", Role::Cashier).await;
        let app = api_with_connect_info(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"username": "kassir1", "password": "nope"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn disabled_account_is_forbidden() {
        let state = test_state().await;
        let (user, _) = seeded_user(&state, "gone", Role::Viewer).await;
        gp_core::db::create_user_repository(&state.db)
            .update(
                user.id,
                &gp_core::UserUpdate {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let app = api_with_connect_info(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/auth/login")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"username": "gone", "password": "Password1"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn me_without_token_is_unauthorized() {
        let state = test_state().await;
        let app = api_with_connect_info(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
