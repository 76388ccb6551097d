//! User management routes (admin only).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::create_user_repository;
use gp_core::{hash_password, validate_password_strength, Role, User, UserFilter, UserUpdate};

use crate::auth::RequireAdmin;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the user management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/", post(create_user))
        .route("/:id", get(get_user))
        .route("/:id", put(update_user))
        .route("/:id", delete(delete_user))
        .route("/:id/password", post(reset_password))
}

/// Query parameters for listing users.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    pub role: Option<String>,
    pub enabled: Option<bool>,
    pub search: Option<String>,
}

/// A user, without sensitive fields.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
    pub display_name: Option<String>,
    pub enabled: bool,
    pub last_login_at: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role.as_str().to_string(),
            display_name: user.display_name,
            enabled: user.enabled,
            last_login_at: user.last_login_at.map(|t| t.to_rfc3339()),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Request to create a user.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: String,
    pub display_name: Option<String>,
}

/// Request to update a user.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub role: Option<String>,
    pub display_name: Option<String>,
    pub enabled: Option<bool>,
}

/// Request to reset another user's password.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

fn parse_role(value: &str) -> Result<Role, ApiError> {
    value.parse::<Role>().map_err(|_| {
        ApiError::validation_field(
            "role",
            &format!("Invalid role '{value}'. Valid roles are: admin, cashier, viewer"),
        )
    })
}

/// Lists users.
async fn list_users(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let filter = UserFilter {
        role: query.role.as_deref().and_then(|r| r.parse().ok()),
        enabled: query.enabled,
        search: query.search,
    };

    let users = create_user_repository(&state.db).list(&filter).await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

/// Creates a user.
async fn create_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    request.validate()?;

    let strength_errors = validate_password_strength(&request.password);
    if !strength_errors.is_empty() {
        return Err(ApiError::validation_field(
            "password",
            &strength_errors.join("; "),
        ));
    }

    let role = parse_role(&request.role)?;
    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;

    let user_repo = create_user_repository(&state.db);

    if user_repo
        .get_by_username(&request.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("Username already in use".to_string()));
    }
    if user_repo.get_by_email(&request.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }

    let mut user = User::new(&request.username, &request.email, password_hash, role);
    user.display_name = request.display_name;

    let created = user_repo.create(&user).await?;

    info!(
        admin = %admin.username,
        username = %created.username,
        role = %created.role,
        "User created"
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Gets a user by id.
async fn get_user(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = create_user_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    Ok(Json(user.into()))
}

/// Updates a user.
async fn update_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    request.validate()?;

    let user_repo = create_user_repository(&state.db);
    let existing = user_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    // Admins cannot lock themselves out.
    if admin.id == id && request.enabled == Some(false) {
        return Err(ApiError::BadRequest(
            "Cannot disable your own account".to_string(),
        ));
    }
    if admin.id == id {
        if let Some(role_str) = &request.role {
            if parse_role(role_str)? != Role::Admin {
                return Err(ApiError::BadRequest(
                    "Cannot demote your own account".to_string(),
                ));
            }
        }
    }

    if let Some(username) = &request.username {
        if username != &existing.username && user_repo.get_by_username(username).await?.is_some() {
            return Err(ApiError::Conflict("Username already in use".to_string()));
        }
    }
    if let Some(email) = &request.email {
        if email != &existing.email && user_repo.get_by_email(email).await?.is_some() {
            return Err(ApiError::Conflict("Email already in use".to_string()));
        }
    }

    let update = UserUpdate {
        username: request.username,
        email: request.email,
        role: request.role.as_deref().map(parse_role).transpose()?,
        display_name: request.display_name.map(Some),
        enabled: request.enabled,
    };

    let updated = user_repo.update(id, &update).await?;

    info!(admin = %admin.username, username = %updated.username, "User updated");

    Ok(Json(updated.into()))
}

/// Deletes a user.
async fn delete_user(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if admin.id == id {
        return Err(ApiError::BadRequest(
            "Cannot delete your own account".to_string(),
        ));
    }

    let user_repo = create_user_repository(&state.db);
    let user = user_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    user_repo.delete(id).await?;

    info!(admin = %admin.username, username = %user.username, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Resets a user's password.
async fn reset_password(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    request.validate()?;

    let strength_errors = validate_password_strength(&request.password);
    if !strength_errors.is_empty() {
        return Err(ApiError::validation_field(
            "password",
            &strength_errors.join("; "),
        ));
    }

    let user_repo = create_user_repository(&state.db);
    let user = user_repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User {id} not found")))?;

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::Internal(format!("Failed to hash password: {e}")))?;
    user_repo.update_password(id, &password_hash).await?;

    info!(admin = %admin.username, username = %user.username, "Password reset");

    Ok(StatusCode::NO_CONTENT)
}
