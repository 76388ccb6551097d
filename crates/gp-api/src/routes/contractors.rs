//! Contractor routes.

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

use gp_core::db::{create_contractor_repository, create_history_repository, PageRequest};
use gp_core::{
    Contractor, ContractorFilter, ContractorUpdate, EntityKind, HistoryAction, HistoryEntry, User,
};

use crate::auth::{AuthenticatedUser, RequireCashier};
use crate::dto::Paged;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the contractor routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_contractors))
        .route("/", post(create_contractor))
        .route("/:id", get(get_contractor))
        .route("/:id", put(update_contractor))
        .route("/:id/archive", post(archive_contractor))
        .route("/:id/restore", post(restore_contractor))
}

/// Query parameters for listing contractors.
#[derive(Debug, Deserialize)]
pub struct ListContractorsQuery {
    pub search: Option<String>,
    pub include_archived: Option<bool>,
    pub position_id: Option<Uuid>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A contractor record.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ContractorResponse {
    pub id: Uuid,
    pub full_name: String,
    pub passport_number: String,
    pub phone: Option<String>,
    pub citizenship_id: Option<Uuid>,
    pub nationality_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
    pub notes: Option<String>,
    pub is_archived: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Contractor> for ContractorResponse {
    fn from(c: Contractor) -> Self {
        Self {
            id: c.id,
            full_name: c.full_name,
            passport_number: c.passport_number,
            phone: c.phone,
            citizenship_id: c.citizenship_id,
            nationality_id: c.nationality_id,
            position_id: c.position_id,
            notes: c.notes,
            is_archived: c.is_archived,
            created_at: c.created_at.to_rfc3339(),
            updated_at: c.updated_at.to_rfc3339(),
        }
    }
}

/// Request to register a contractor.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateContractorRequest {
    #[validate(length(min = 1, max = 200, message = "Full name is required"))]
    pub full_name: String,
    #[validate(length(min = 5, max = 20, message = "Passport number must be 5-20 characters"))]
    pub passport_number: String,
    pub phone: Option<String>,
    pub citizenship_id: Option<Uuid>,
    pub nationality_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Request to update a contractor. Absent fields are left unchanged;
/// nullable fields can be cleared by sending `null` explicitly.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateContractorRequest {
    #[validate(length(min = 1, max = 200, message = "Full name must not be empty"))]
    pub full_name: Option<String>,
    #[validate(length(min = 5, max = 20, message = "Passport number must be 5-20 characters"))]
    pub passport_number: Option<String>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub citizenship_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub nationality_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<Uuid>)]
    pub position_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "crate::dto::double_option")]
    #[schema(value_type = Option<String>)]
    pub notes: Option<Option<String>>,
}

/// Writes a history entry, logging instead of failing the request.
async fn record_history(state: &AppState, entry: HistoryEntry) {
    if let Err(e) = create_history_repository(&state.db).record(&entry).await {
        warn!(error = %e, "Failed to record history entry");
    }
}

/// Lists contractors with pagination and search.
#[utoipa::path(
    get,
    path = "/api/v1/contractors",
    responses((status = 200, description = "Paginated contractors")),
    tag = "Contractors"
)]
pub async fn list_contractors(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListContractorsQuery>,
) -> Result<Json<Paged<ContractorResponse>>, ApiError> {
    let filter = ContractorFilter {
        search: query.search,
        include_archived: query.include_archived.unwrap_or(false),
        position_id: query.position_id,
    };
    let page = PageRequest::from_query(query.page, query.per_page);

    let result = create_contractor_repository(&state.db)
        .list(&filter, &page)
        .await?;

    Ok(Json(Paged::from_page(result, Into::into)))
}

/// Registers a contractor.
#[utoipa::path(
    post,
    path = "/api/v1/contractors",
    request_body = CreateContractorRequest,
    responses(
        (status = 201, description = "Contractor created", body = ContractorResponse),
        (status = 409, description = "Passport number already registered")
    ),
    tag = "Contractors"
)]
pub async fn create_contractor(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Json(request): Json<CreateContractorRequest>,
) -> Result<(StatusCode, Json<ContractorResponse>), ApiError> {
    request.validate()?;

    let repo = create_contractor_repository(&state.db);

    if repo
        .get_by_passport(&request.passport_number)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "Passport number already registered".to_string(),
        ));
    }

    let mut contractor = Contractor::new(&request.full_name, &request.passport_number);
    contractor.phone = request.phone;
    contractor.citizenship_id = request.citizenship_id;
    contractor.nationality_id = request.nationality_id;
    contractor.position_id = request.position_id;
    contractor.notes = request.notes;

    let created = repo.create(&contractor).await?;

    info!(
        actor = %user.username,
        contractor = %created.full_name,
        "Contractor registered"
    );

    record_history(
        &state,
        HistoryEntry::new(
            EntityKind::Contractor,
            created.id,
            HistoryAction::Created,
            &user.username,
        )
        .with_details(serde_json::json!({"passport_number": created.passport_number})),
    )
    .await;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Gets a contractor by id.
#[utoipa::path(
    get,
    path = "/api/v1/contractors/{id}",
    responses(
        (status = 200, description = "The contractor", body = ContractorResponse),
        (status = 404, description = "Unknown contractor")
    ),
    tag = "Contractors"
)]
pub async fn get_contractor(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ContractorResponse>, ApiError> {
    let contractor = create_contractor_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Contractor {id} not found")))?;

    Ok(Json(contractor.into()))
}

/// Updates a contractor.
async fn update_contractor(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateContractorRequest>,
) -> Result<Json<ContractorResponse>, ApiError> {
    request.validate()?;

    let repo = create_contractor_repository(&state.db);
    let existing = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Contractor {id} not found")))?;

    if let Some(passport) = &request.passport_number {
        if passport != &existing.passport_number
            && repo.get_by_passport(passport).await?.is_some()
        {
            return Err(ApiError::Conflict(
                "Passport number already registered".to_string(),
            ));
        }
    }

    let update = ContractorUpdate {
        full_name: request.full_name,
        passport_number: request.passport_number,
        phone: request.phone,
        citizenship_id: request.citizenship_id,
        nationality_id: request.nationality_id,
        position_id: request.position_id,
        notes: request.notes,
    };

    let updated = repo.update(id, &update).await?;

    record_history(
        &state,
        HistoryEntry::new(
            EntityKind::Contractor,
            id,
            HistoryAction::Updated,
            &user.username,
        ),
    )
    .await;

    Ok(Json(updated.into()))
}

/// Archives a contractor.
async fn archive_contractor(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    set_archived(&state, &user, id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restores an archived contractor.
async fn restore_contractor(
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
    create_contractor_repository(&state.db)
        .set_archived(id, archived)
        .await?;

    let action = if archived {
        HistoryAction::Archived
    } else {
        HistoryAction::Restored
    };
    record_history(
        state,
        HistoryEntry::new(EntityKind::Contractor, id, action, &user.username),
    )
    .await;

    info!(actor = %user.username, contractor_id = %id, archived, "Contractor archival changed");
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

    async fn create(
        app: &Router,
        token: &str,
        full_name: &str,
        passport: &str,
    ) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/contractors")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "full_name": full_name,
                            "passport_number": passport
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn create_then_duplicate_passport_conflicts() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let first = create(&app, &token, "Karimov Aziz", "AB1234567").await;
        assert_eq!(first.status(), StatusCode::CREATED);
        let created: ContractorResponse = body_json(first).await;
        assert_eq!(created.passport_number, "AB1234567");

        let duplicate = create(&app, &token, "Someone Else", "AB1234567").await;
        assert_eq!(duplicate.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn viewer_cannot_create() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "viewer", Role::Viewer).await;

        let response = create(&app, &token, "Karimov Aziz", "AB1234567").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_paginates() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        for i in 0..3 {
            let response = create(&app, &token, &format!("Worker {i}"), &format!("PP00000{i}")).await;
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/contractors?per_page=2")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let page: Paged<ContractorResponse> = body_json(response).await;
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.pagination.total_items, 3);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[tokio::test]
    async fn archive_then_restore() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let created: ContractorResponse =
            body_json(create(&app, &token, "Archived Worker", "AR0000001").await).await;

        let archive = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/contractors/{}/archive", created.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(archive.status(), StatusCode::NO_CONTENT);

        let fetched = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/contractors/{}", created.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let contractor: ContractorResponse = body_json(fetched).await;
        assert!(contractor.is_archived);

        let restore = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/contractors/{}/restore", created.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(restore.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn validation_failure_is_422() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let response = create(&app, &token, "", "x").await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
