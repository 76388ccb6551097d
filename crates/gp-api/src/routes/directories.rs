//! Reference directory routes.
//!
//! One set of handlers serves all seven catalogs; the first path
//! segment names the kind (`/directories/citizenships`,
//! `/directories/store-numbers`, ...).

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

use gp_core::db::create_directory_repository;
use gp_core::{DirectoryEntry, DirectoryKind};

use crate::auth::{AuthenticatedUser, RequireAdmin};
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the directory routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:kind", get(list_entries))
        .route("/:kind", post(create_entry))
        .route("/:kind/:id", put(rename_entry))
        .route("/:kind/:id/archive", post(archive_entry))
        .route("/:kind/:id/restore", post(restore_entry))
}

fn parse_kind(segment: &str) -> Result<DirectoryKind, ApiError> {
    segment
        .parse::<DirectoryKind>()
        .map_err(|_| ApiError::NotFound(format!("Unknown directory: {segment}")))
}

/// A directory entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DirectoryEntryResponse {
    pub id: Uuid,
    pub kind: String,
    pub name: String,
    pub is_archived: bool,
}

impl From<DirectoryEntry> for DirectoryEntryResponse {
    fn from(e: DirectoryEntry) -> Self {
        Self {
            id: e.id,
            kind: e.kind.as_str().to_string(),
            name: e.name,
            is_archived: e.is_archived,
        }
    }
}

/// Request to create or rename an entry.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DirectoryEntryRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
}

/// Query for directory listings.
#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    pub include_archived: Option<bool>,
}

/// Lists a catalog.
async fn list_entries(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(kind): Path<String>,
    Query(query): Query<ListEntriesQuery>,
) -> Result<Json<Vec<DirectoryEntryResponse>>, ApiError> {
    let kind = parse_kind(&kind)?;

    let entries = create_directory_repository(&state.db)
        .list(kind, query.include_archived.unwrap_or(false))
        .await?;

    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

/// Adds an entry to a catalog.
async fn create_entry(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(kind): Path<String>,
    Json(request): Json<DirectoryEntryRequest>,
) -> Result<(StatusCode, Json<DirectoryEntryResponse>), ApiError> {
    request.validate()?;
    let kind = parse_kind(&kind)?;

    let entry = DirectoryEntry::new(kind, request.name.trim());
    let created = create_directory_repository(&state.db).create(&entry).await?;

    info!(admin = %admin.username, kind = %kind, name = %created.name, "Directory entry added");

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Renames an entry.
async fn rename_entry(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path((kind, id)): Path<(String, Uuid)>,
    Json(request): Json<DirectoryEntryRequest>,
) -> Result<Json<DirectoryEntryResponse>, ApiError> {
    request.validate()?;
    let kind = parse_kind(&kind)?;

    let repo = create_directory_repository(&state.db);

    // The id must belong to the catalog named in the path.
    let existing = repo
        .get(id)
        .await?
        .filter(|e| e.kind == kind)
        .ok_or_else(|| ApiError::NotFound(format!("Entry {id} not found in {kind}")))?;

    let renamed = repo.rename(existing.id, request.name.trim()).await?;
    Ok(Json(renamed.into()))
}

/// Archives an entry.
async fn archive_entry(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    set_archived(&state, &admin.username, &kind, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restores an archived entry.
async fn restore_entry(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<StatusCode, ApiError> {
    set_archived(&state, &admin.username, &kind, id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_archived(
    state: &AppState,
    admin: &str,
    kind: &str,
    id: Uuid,
    archived: bool,
) -> Result<(), ApiError> {
    let kind = parse_kind(kind)?;
    let repo = create_directory_repository(&state.db);

    repo.get(id)
        .await?
        .filter(|e| e.kind == kind)
        .ok_or_else(|| ApiError::NotFound(format!("Entry {id} not found in {kind}")))?;

    repo.set_archived(id, archived).await?;

    info!(admin = %admin, kind = %kind, entry_id = %id, archived, "Directory entry archival changed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api, body_json, seeded_user};
    use axum::body::Body;
    use axum::http::{header, Request};
    use gp_core::Role;
    use tower::ServiceExt;

    async fn create(app: &Router, token: &str, kind: &str, name: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/directories/{kind}"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"name": name}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_list_per_kind() {
        let (app, state) = api().await;
        let (_, admin) = seeded_user(&state, "admin", Role::Admin).await;

        assert_eq!(
            create(&app, &admin, "citizenships", "Uzbekistan").await.status(),
            StatusCode::CREATED
        );
        assert_eq!(
            create(&app, &admin, "positions", "Seller").await.status(),
            StatusCode::CREATED
        );

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/directories/citizenships")
                    .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let entries: Vec<DirectoryEntryResponse> = body_json(response).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Uzbekistan");
    }

    #[tokio::test]
    async fn duplicate_name_in_kind_conflicts() {
        let (app, state) = api().await;
        let (_, admin) = seeded_user(&state, "admin", Role::Admin).await;

        create(&app, &admin, "buildings", "A").await;
        let duplicate = create(&app, &admin, "buildings", "A").await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);

        // The same name in another catalog is fine
        let other = create(&app, &admin, "floors", "A").await;
        assert_eq!(other.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn unknown_kind_is_not_found() {
        let (app, state) = api().await;
        let (_, admin) = seeded_user(&state, "admin", Role::Admin).await;

        let response = create(&app, &admin, "warehouses", "X").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rename_checks_kind_membership() {
        let (app, state) = api().await;
        let (_, admin) = seeded_user(&state, "admin", Role::Admin).await;

        let created: DirectoryEntryResponse =
            body_json(create(&app, &admin, "lines", "Line 1").await).await;

        // Renaming through the wrong catalog path is a 404
        let wrong = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/directories/floors/{}", created.id))
                    .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"name": "Nope"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::NOT_FOUND);

        let renamed = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/directories/lines/{}", created.id))
                    .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"name": "Line 1a"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(renamed.status(), StatusCode::OK);
        let entry: DirectoryEntryResponse = body_json(renamed).await;
        assert_eq!(entry.name, "Line 1a");
    }

    #[tokio::test]
    async fn writes_require_admin() {
        let (app, state) = api().await;
        let (_, cashier) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let response = create(&app, &cashier, "positions", "Guard").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
