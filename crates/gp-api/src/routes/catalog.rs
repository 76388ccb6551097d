//! Pass catalog routes: pass groups and pass types.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::create_pass_catalog_repository;
use gp_core::pass::{PassGroup, PassType, PassTypeUpdate};

use crate::auth::{AuthenticatedUser, RequireAdmin};
use crate::error::ApiError;
use crate::state::AppState;

/// Routes mounted at `/pass-groups`.
pub fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_groups))
        .route("/", post(create_group))
        .route("/:id", put(update_group))
        .route("/:id/archive", post(archive_group))
}

/// Routes mounted at `/pass-types`.
pub fn type_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_types))
        .route("/", post(create_type))
        .route("/:id", get(get_type))
        .route("/:id", put(update_type))
        .route("/:id/archive", post(archive_type))
        .route("/:id/restore", post(restore_type))
}

/// A pass group.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PassGroupResponse {
    pub id: Uuid,
    pub name: String,
    pub sort_order: i32,
    pub is_archived: bool,
}

impl From<PassGroup> for PassGroupResponse {
    fn from(g: PassGroup) -> Self {
        Self {
            id: g.id,
            name: g.name,
            sort_order: g.sort_order,
            is_archived: g.is_archived,
        }
    }
}

/// A pass type.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PassTypeResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub cost_cents: i64,
    pub duration_days: i32,
    pub is_archived: bool,
}

impl From<PassType> for PassTypeResponse {
    fn from(t: PassType) -> Self {
        Self {
            id: t.id,
            group_id: t.group_id,
            name: t.name,
            cost_cents: t.cost_cents,
            duration_days: t.duration_days,
            is_archived: t.is_archived,
        }
    }
}

/// Request to create or rename a pass group.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PassGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Group name is required"))]
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// Request to create a pass type.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePassTypeRequest {
    pub group_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Type name is required"))]
    pub name: String,
    #[validate(range(min = 0, message = "Cost must not be negative"))]
    pub cost_cents: i64,
    #[validate(range(min = 1, max = 3660, message = "Duration must be 1-3660 days"))]
    pub duration_days: i32,
}

/// Request to update a pass type.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdatePassTypeRequest {
    pub group_id: Option<Uuid>,
    #[validate(length(min = 1, max = 100, message = "Type name must not be empty"))]
    pub name: Option<String>,
    #[validate(range(min = 0, message = "Cost must not be negative"))]
    pub cost_cents: Option<i64>,
    #[validate(range(min = 1, max = 3660, message = "Duration must be 1-3660 days"))]
    pub duration_days: Option<i32>,
}

/// Query for listing pass types.
#[derive(Debug, Deserialize)]
pub struct ListTypesQuery {
    pub group_id: Option<Uuid>,
    pub include_archived: Option<bool>,
}

/// Query for listing groups.
#[derive(Debug, Deserialize)]
pub struct ListGroupsQuery {
    pub include_archived: Option<bool>,
}

// Groups

async fn list_groups(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListGroupsQuery>,
) -> Result<Json<Vec<PassGroupResponse>>, ApiError> {
    let groups = create_pass_catalog_repository(&state.db)
        .list_groups(query.include_archived.unwrap_or(false))
        .await?;
    Ok(Json(groups.into_iter().map(Into::into).collect()))
}

async fn create_group(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<PassGroupRequest>,
) -> Result<(StatusCode, Json<PassGroupResponse>), ApiError> {
    request.validate()?;

    let group = PassGroup::new(&request.name, request.sort_order);
    let created = create_pass_catalog_repository(&state.db)
        .create_group(&group)
        .await?;

    info!(admin = %admin.username, group = %created.name, "Pass group created");

    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn update_group(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<PassGroupRequest>,
) -> Result<Json<PassGroupResponse>, ApiError> {
    request.validate()?;

    let updated = create_pass_catalog_repository(&state.db)
        .rename_group(id, &request.name, request.sort_order)
        .await?;
    Ok(Json(updated.into()))
}

/// Archives a group. Refused while the group still has active types.
async fn archive_group(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    create_pass_catalog_repository(&state.db)
        .archive_group(id)
        .await?;

    info!(admin = %admin.username, group_id = %id, "Pass group archived");
    Ok(StatusCode::NO_CONTENT)
}

// Types

async fn list_types(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListTypesQuery>,
) -> Result<Json<Vec<PassTypeResponse>>, ApiError> {
    let types = create_pass_catalog_repository(&state.db)
        .list_types(query.group_id, query.include_archived.unwrap_or(false))
        .await?;
    Ok(Json(types.into_iter().map(Into::into).collect()))
}

async fn get_type(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PassTypeResponse>, ApiError> {
    let pass_type = create_pass_catalog_repository(&state.db)
        .get_type(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pass type {id} not found")))?;
    Ok(Json(pass_type.into()))
}

async fn create_type(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreatePassTypeRequest>,
) -> Result<(StatusCode, Json<PassTypeResponse>), ApiError> {
    request.validate()?;

    let repo = create_pass_catalog_repository(&state.db);

    // The group must exist and be active before we hang types off it.
    let group = repo
        .get_group(request.group_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pass group {} not found", request.group_id)))?;
    if group.is_archived {
        return Err(ApiError::Conflict(
            "Cannot add types to an archived group".to_string(),
        ));
    }

    let pass_type = PassType::new(
        request.group_id,
        &request.name,
        request.cost_cents,
        request.duration_days,
    );
    let created = repo.create_type(&pass_type).await?;

    info!(
        admin = %admin.username,
        pass_type = %created.name,
        cost_cents = created.cost_cents,
        "Pass type created"
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn update_type(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdatePassTypeRequest>,
) -> Result<Json<PassTypeResponse>, ApiError> {
    request.validate()?;

    let update = PassTypeUpdate {
        name: request.name,
        group_id: request.group_id,
        cost_cents: request.cost_cents,
        duration_days: request.duration_days,
    };

    let updated = create_pass_catalog_repository(&state.db)
        .update_type(id, &update)
        .await?;
    Ok(Json(updated.into()))
}

async fn archive_type(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    create_pass_catalog_repository(&state.db)
        .set_type_archived(id, true)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn restore_type(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    create_pass_catalog_repository(&state.db)
        .set_type_archived(id, false)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api, body_json, seeded_user};
    use axum::body::Body;
    use axum::http::{header, Request};
    use gp_core::Role;
    use tower::ServiceExt;

    async fn create_group_req(app: &Router, token: &str, name: &str) -> PassGroupResponse {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pass-groups")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"name": name}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn catalog_crud_flow() {
        let (app, state) = api().await;
        let (_, admin_token) = seeded_user(&state, "admin", Role::Admin).await;

        let group = create_group_req(&app, &admin_token, "Monthly").await;

        let created = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pass-types")
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "group_id": group.id,
                            "name": "Standard",
                            "cost_cents": 15000,
                            "duration_days": 30
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let pass_type: PassTypeResponse = body_json(created).await;
        assert_eq!(pass_type.cost_cents, 15000);

        // Group with live types cannot be archived
        let blocked = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/pass-groups/{}/archive", group.id))
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(blocked.status(), StatusCode::CONFLICT);

        // Archive the type, then the group succeeds
        let archive_type = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/pass-types/{}/archive", pass_type.id))
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(archive_type.status(), StatusCode::NO_CONTENT);

        let archive_group = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/pass-groups/{}/archive", group.id))
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(archive_group.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn writes_require_admin() {
        let (app, state) = api().await;
        let (_, cashier_token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pass-groups")
                    .header(header::AUTHORIZATION, format!("Bearer {cashier_token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"name": "Nope"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn duplicate_group_name_conflicts() {
        let (app, state) = api().await;
        let (_, admin_token) = seeded_user(&state, "admin", Role::Admin).await;

        create_group_req(&app, &admin_token, "Monthly").await;

        let duplicate = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/pass-groups")
                    .header(header::AUTHORIZATION, format!("Bearer {admin_token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"name": "Monthly"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    }
}
