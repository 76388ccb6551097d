//! Store routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::{create_history_repository, create_store_repository, PageRequest};
use gp_core::{EntityKind, HistoryAction, HistoryEntry, Store, StoreFilter, StoreUpdate, User};

use crate::auth::{AuthenticatedUser, RequireCashier};
use crate::dto::Paged;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the store routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stores))
        .route("/", post(create_store))
        .route("/:id", get(get_store))
        .route("/:id", put(update_store))
        .route("/:id/archive", post(archive_store))
        .route("/:id/restore", post(restore_store))
}

/// Query parameters for listing stores.
#[derive(Debug, Deserialize)]
pub struct ListStoresQuery {
    pub search: Option<String>,
    pub include_archived: Option<bool>,
    pub building_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A store record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StoreResponse {
    pub id: Uuid,
    pub name: String,
    pub store_number_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    pub floor_id: Option<Uuid>,
    pub line_id: Option<Uuid>,
    pub owner_name: Option<String>,
    pub contact_phone: Option<String>,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Store> for StoreResponse {
    fn from(s: Store) -> Self {
        Self {
            id: s.id,
            name: s.name,
            store_number_id: s.store_number_id,
            building_id: s.building_id,
            floor_id: s.floor_id,
            line_id: s.line_id,
            owner_name: s.owner_name,
            contact_phone: s.contact_phone,
            is_archived: s.is_archived,
            created_at: s.created_at.to_rfc3339(),
            updated_at: s.updated_at.to_rfc3339(),
        }
    }
}

/// Request to create a store.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateStoreRequest {
    #[validate(length(min = 1, max = 200, message = "Store name is required"))]
    pub name: String,
    pub store_number_id: Option<Uuid>,
    pub building_id: Option<Uuid>,
    pub floor_id: Option<Uuid>,
    pub line_id: Option<Uuid>,
    pub owner_name: Option<String>,
    pub contact_phone: Option<String>,
}

/// Request to update a store.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateStoreRequest {
    #[validate(length(min = 1, max = 200, message = "Store name must not be empty"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub store_number_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub building_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub floor_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub line_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<String>)]
    pub owner_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<String>)]
    pub contact_phone: Option<Option<String>>,
}

async fn record_history(state: &AppState, entry: HistoryEntry) {
    if let Err(e) = create_history_repository(&state.db).record(&entry).await {
        warn!(error = %e, "Failed to record history entry");
    }
}

/// Lists stores with pagination and search.
async fn list_stores(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListStoresQuery>,
) -> Result<Json<Paged<StoreResponse>>, ApiError> {
    let filter = StoreFilter {
        search: query.search,
        include_archived: query.include_archived.unwrap_or(false),
        building_id: query.building_id,
    };
    let page = PageRequest::from_query(query.page, query.per_page);

    let result = create_store_repository(&state.db).list(&filter, &page).await?;
    Ok(Json(Paged::from_page(result, Into::into)))
}

/// Creates a store.
async fn create_store(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Json(request): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<StoreResponse>), ApiError> {
    request.validate()?;

    let repo = create_store_repository(&state.db);
    if repo.get_by_name(&request.name).await?.is_some() {
        return Err(ApiError::Conflict("Store name already in use".to_string()));
    }

    let mut store = Store::new(&request.name);
    store.store_number_id = request.store_number_id;
    store.building_id = request.building_id;
    store.floor_id = request.floor_id;
    store.line_id = request.line_id;
    store.owner_name = request.owner_name;
    store.contact_phone = request.contact_phone;

    let created = repo.create(&store).await?;

    info!(actor = %user.username, store = %created.name, "Store created");

    record_history(
        &state,
        HistoryEntry::new(
            EntityKind::Store,
            created.id,
            HistoryAction::Created,
            &user.username,
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Gets a store by id.
async fn get_store(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<StoreResponse>, ApiError> {
    let store = create_store_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Store {id} not found")))?;

    Ok(Json(store.into()))
}

/// Updates a store.
async fn update_store(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStoreRequest>,
) -> Result<Json<StoreResponse>, ApiError> {
    request.validate()?;

    let repo = create_store_repository(&state.db);
    let existing = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Store {id} not found")))?;

    if let Some(name) = &request.name {
        if name != &existing.name && repo.get_by_name(name).await?.is_some() {
            return Err(ApiError::Conflict("Store name already in use".to_string()));
        }
    }

    let update = StoreUpdate {
        name: request.name,
        store_number_id: request.store_number_id,
        building_id: request.building_id,
        floor_id: request.floor_id,
        line_id: request.line_id,
        owner_name: request.owner_name,
        contact_phone: request.contact_phone,
    };

    let updated = repo.update(id, &update).await?;

    record_history(
        &state,
        HistoryEntry::new(EntityKind::Store, id, HistoryAction::Updated, &user.username),
    )
    .await;

    Ok(Json(updated.into()))
}

/// Archives a store.
async fn archive_store(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    set_archived(&state, &user, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restores an archived store.
async fn restore_store(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    set_archived(&state, &user, id, false).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_archived(
    state: &AppState,
    user: &User,
    id: Uuid,
    archived: bool,
) -> Result<(), ApiError> {
    create_store_repository(&state.db)
        .set_archived(id, archived)
        .await?;

    let action = if archived {
        HistoryAction::Archived
    } else {
        HistoryAction::Restored
    };
    record_history(
        state,
        HistoryEntry::new(EntityKind::Store, id, action, &user.username),
    )
    .await;

    info!(actor = %user.username, store_id = %id, archived, "Store archival changed");
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

    #[tokio::test]
    async fn create_and_duplicate_name_conflicts() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let body = serde_json::json!({"name": "Row 3, Box 7", "owner_name": "Nazarov"});
        let request = |body: String| {
            Request::builder()
                .method("POST")
                .uri("/api/v1/stores")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap()
        };

        let created = app.clone().oneshot(request(body.to_string())).await.unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let store: StoreResponse = body_json(created).await;
        assert_eq!(store.owner_name.as_deref(), Some("Nazarov"));

        let duplicate = app.oneshot(request(body.to_string())).await.unwrap();
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn update_can_clear_owner() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let created = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/stores")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"name": "Shoes 5", "owner_name": "Old Owner"})
                            .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        let store: StoreResponse = body_json(created).await;

        let updated = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/v1/stores/{}", store.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({"owner_name": null}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(updated.status(), StatusCode::OK);
        let store: StoreResponse = body_json(updated).await;
        assert!(store.owner_name.is_none());
        assert_eq!(store.name, "Shoes 5");
    }
}
