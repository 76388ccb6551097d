//! Issued pass routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::{
    create_contractor_repository, create_history_repository, create_pass_catalog_repository,
    create_pass_repository, create_store_repository, PageRequest,
};
use gp_core::pass::{Pass, PassFilter, PassStatus};
use gp_core::{BackofficeEvent, EntityKind, HistoryAction, HistoryEntry};
use gp_observability::metrics::names;

use crate::auth::{AuthenticatedUser, RequireCashier};
use crate::dto::Paged;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the pass routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_passes))
        .route("/", post(issue_pass))
        .route("/:id", get(get_pass))
        .route("/:id/close", post(close_pass))
        .route("/:id/archive", post(archive_pass))
}

/// Query parameters for listing passes.
#[derive(Debug, Deserialize)]
pub struct ListPassesQuery {
    pub contractor_id: Option<Uuid>,
    pub store_id: Option<Uuid>,
    pub status: Option<String>,
    pub search: Option<String>,
    pub include_archived: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// An issued pass.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PassResponse {
    pub id: Uuid,
    pub number: String,
    pub contractor_id: Uuid,
    pub store_id: Uuid,
    pub pass_type_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub status: String,
    pub is_archived: bool,
    pub created_at: String,
}

impl From<Pass> for PassResponse {
    fn from(p: Pass) -> Self {
        Self {
            id: p.id,
            number: p.number,
            contractor_id: p.contractor_id,
            store_id: p.store_id,
            pass_type_id: p.pass_type_id,
            transaction_id: p.transaction_id,
            starts_on: p.starts_on,
            ends_on: p.ends_on,
            status: p.status.as_str().to_string(),
            is_archived: p.is_archived,
            created_at: p.created_at.to_rfc3339(),
        }
    }
}

/// Request to issue a pass outside a till transaction.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssuePassRequest {
    pub contractor_id: Uuid,
    pub store_id: Uuid,
    pub pass_type_id: Uuid,
    /// First valid day; today when absent.
    pub starts_on: Option<NaiveDate>,
    /// Pre-printed card number; generated when absent.
    #[validate(length(min = 4, max = 32, message = "Pass number must be 4-32 characters"))]
    pub number: Option<String>,
}

async fn record_history(state: &AppState, entry: HistoryEntry) {
    if let Err(e) = create_history_repository(&state.db).record(&entry).await {
        warn!(error = %e, "Failed to record history entry");
    }
}

/// Lists passes with filters and pagination.
async fn list_passes(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListPassesQuery>,
) -> Result<Json<Paged<PassResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<PassStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid pass status: {s}")))
        })
        .transpose()?;

    let filter = PassFilter {
        contractor_id: query.contractor_id,
        store_id: query.store_id,
        status,
        search: query.search,
        include_archived: query.include_archived.unwrap_or(false),
    };
    let page = PageRequest::from_query(query.page, query.per_page);

    let result = create_pass_repository(&state.db).list(&filter, &page).await?;
    Ok(Json(Paged::from_page(result, Into::into)))
}

/// Issues a pass directly, without a cashier transaction.
async fn issue_pass(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Json(request): Json<IssuePassRequest>,
) -> Result<(StatusCode, Json<PassResponse>), ApiError> {
    request.validate()?;

    // Resolve and validate the referenced records before writing.
    let contractor = create_contractor_repository(&state.db)
        .get(request.contractor_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Unknown contractor".to_string()))?;
    let store = create_store_repository(&state.db)
        .get(request.store_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Unknown store".to_string()))?;
    let pass_type = create_pass_catalog_repository(&state.db)
        .get_type(request.pass_type_id)
        .await?
        .ok_or_else(|| ApiError::BadRequest("Unknown pass type".to_string()))?;

    if contractor.is_archived {
        return Err(ApiError::Conflict(
            "Contractor is archived; restore before issuing passes".to_string(),
        ));
    }
    if store.is_archived {
        return Err(ApiError::Conflict("Store is archived".to_string()));
    }
    if pass_type.is_archived {
        return Err(ApiError::Conflict("Pass type is archived".to_string()));
    }

    let repo = create_pass_repository(&state.db);

    let starts_on = request.starts_on.unwrap_or_else(|| Utc::now().date_naive());
    let mut pass = Pass::issue(contractor.id, store.id, &pass_type, starts_on);
    if let Some(number) = request.number {
        if repo.get_by_number(&number).await?.is_some() {
            return Err(ApiError::Conflict(format!(
                "Pass number {number} already exists"
            )));
        }
        pass.number = number;
    }

    let created = repo.create(&pass).await?;

    metrics::counter!(names::PASSES_ISSUED).increment(1);
    info!(
        actor = %user.username,
        number = %created.number,
        contractor = %contractor.full_name,
        "Pass issued"
    );

    record_history(
        &state,
        HistoryEntry::new(
            EntityKind::Pass,
            created.id,
            HistoryAction::Created,
            &user.username,
        )
        .with_details(serde_json::json!({"number": created.number})),
    )
    .await;

    state
        .event_bus
        .publish(BackofficeEvent::PassIssued {
            pass_id: created.id,
            contractor_id: created.contractor_id,
            number: created.number.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Gets a pass by id.
async fn get_pass(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PassResponse>, ApiError> {
    let pass = create_pass_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pass {id} not found")))?;
    Ok(Json(pass.into()))
}

/// Closes an open pass. Closing a closed pass is a conflict.
async fn close_pass(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<Json<PassResponse>, ApiError> {
    let closed = create_pass_repository(&state.db).close(id).await?;

    info!(actor = %user.username, number = %closed.number, "Pass closed");

    record_history(
        &state,
        HistoryEntry::new(EntityKind::Pass, id, HistoryAction::Closed, &user.username),
    )
    .await;

    state
        .event_bus
        .publish(BackofficeEvent::PassClosed {
            pass_id: closed.id,
            number: closed.number.clone(),
        })
        .await;

    Ok(Json(closed.into()))
}

/// Archives a pass.
async fn archive_pass(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    create_pass_repository(&state.db).set_archived(id, true).await?;

    record_history(
        &state,
        HistoryEntry::new(EntityKind::Pass, id, HistoryAction::Archived, &user.username),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
