//! Cashier transaction routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::{
    create_contractor_repository, create_history_repository, create_pass_catalog_repository,
    create_store_repository, create_transaction_repository, PageRequest,
};
use gp_core::pass::Pass;
use gp_core::transaction::{PassTransaction, TransactionFilter};
use gp_core::{BackofficeEvent, EntityKind, HistoryAction, HistoryEntry};
use gp_observability::metrics::names;

use crate::auth::{AuthenticatedUser, RequireCashier};
use crate::dto::Paged;
use crate::error::ApiError;
use crate::routes::passes::PassResponse;
use crate::state::AppState;

/// Creates the transaction routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_transactions))
        .route("/", post(create_transaction))
        .route("/:id", get(get_transaction))
}

/// One item of a new transaction.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionItemRequest {
    pub contractor_id: Uuid,
    pub store_id: Uuid,
    pub pass_type_id: Uuid,
}

/// Request to create a transaction.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTransactionRequest {
    #[validate(length(min = 1, max = 20, message = "A transaction needs 1-20 items"))]
    pub items: Vec<TransactionItemRequest>,
    /// First valid day for the issued passes; today when absent.
    pub starts_on: Option<NaiveDate>,
    pub note: Option<String>,
}

/// A completed transaction.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub token: String,
    pub cashier_id: Uuid,
    pub total_cents: i64,
    pub note: Option<String>,
    pub starts_on: NaiveDate,
    pub created_at: String,
}

impl From<PassTransaction> for TransactionResponse {
    fn from(t: PassTransaction) -> Self {
        Self {
            id: t.id,
            token: t.token,
            cashier_id: t.cashier_id,
            total_cents: t.total_cents,
            note: t.note,
            starts_on: t.starts_on,
            created_at: t.created_at.to_rfc3339(),
        }
    }
}

/// A transaction with the passes it paid for.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionDetailResponse {
    #[serde(flatten)]
    pub transaction: TransactionResponse,
    pub passes: Vec<PassResponse>,
}

/// Query parameters for listing transactions.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    pub cashier_id: Option<Uuid>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Creates a transaction: one pass per item, all inside one database
/// transaction.
async fn create_transaction(
    State(state): State<AppState>,
    RequireCashier(cashier): RequireCashier,
    Json(request): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<TransactionDetailResponse>), ApiError> {
    request.validate()?;

    let contractor_repo = create_contractor_repository(&state.db);
    let store_repo = create_store_repository(&state.db);
    let catalog = create_pass_catalog_repository(&state.db);

    let starts_on = request.starts_on.unwrap_or_else(|| Utc::now().date_naive());

    // Resolve every reference up front; a single bad id fails the whole
    // bundle before anything is written.
    let mut resolved = Vec::with_capacity(request.items.len());
    let mut total_cents: i64 = 0;
    for (idx, item) in request.items.iter().enumerate() {
        let contractor = contractor_repo
            .get(item.contractor_id)
            .await?
            .filter(|c| !c.is_archived)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("Item {idx}: unknown or archived contractor"))
            })?;
        let store = store_repo
            .get(item.store_id)
            .await?
            .filter(|s| !s.is_archived)
            .ok_or_else(|| ApiError::BadRequest(format!("Item {idx}: unknown or archived store")))?;
        let pass_type = catalog
            .get_type(item.pass_type_id)
            .await?
            .filter(|t| !t.is_archived)
            .ok_or_else(|| {
                ApiError::BadRequest(format!("Item {idx}: unknown or archived pass type"))
            })?;

        total_cents += pass_type.cost_cents;
        resolved.push((contractor, store, pass_type));
    }

    let mut transaction = PassTransaction::new(cashier.id, total_cents, starts_on);
    transaction.note = request.note;

    let passes: Vec<Pass> = resolved
        .iter()
        .map(|(contractor, store, pass_type)| {
            let mut pass = Pass::issue(contractor.id, store.id, pass_type, starts_on);
            pass.transaction_id = Some(transaction.id);
            pass
        })
        .collect();

    create_transaction_repository(&state.db)
        .create_with_passes(&transaction, &passes)
        .await?;

    metrics::counter!(names::TRANSACTIONS_CREATED).increment(1);
    metrics::counter!(names::PASSES_ISSUED).increment(passes.len() as u64);

    info!(
        cashier = %cashier.username,
        token = %transaction.token,
        total_cents,
        passes = passes.len(),
        "Transaction created"
    );

    let history = create_history_repository(&state.db);
    if let Err(e) = history
        .record(
            &HistoryEntry::new(
                EntityKind::Transaction,
                transaction.id,
                HistoryAction::Created,
                &cashier.username,
            )
            .with_details(serde_json::json!({
                "token": transaction.token,
                "total_cents": total_cents,
                "passes": passes.len(),
            })),
        )
        .await
    {
        warn!(error = %e, "Failed to record transaction history");
    }

    state
        .event_bus
        .publish(BackofficeEvent::TransactionCreated {
            transaction_id: transaction.id,
            token: transaction.token.clone(),
            total_cents,
            pass_count: passes.len(),
        })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(TransactionDetailResponse {
            transaction: transaction.into(),
            passes: passes.into_iter().map(Into::into).collect(),
        }),
    ))
}

/// Lists transactions.
async fn list_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<Paged<TransactionResponse>>, ApiError> {
    let filter = TransactionFilter {
        cashier_id: query.cashier_id,
        since: query.since,
        until: query.until,
        search: query.search,
    };
    let page = PageRequest::from_query(query.page, query.per_page);

    let result = create_transaction_repository(&state.db)
        .list(&filter, &page)
        .await?;
    Ok(Json(Paged::from_page(result, Into::into)))
}

/// Gets a transaction with its passes.
async fn get_transaction(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TransactionDetailResponse>, ApiError> {
    let repo = create_transaction_repository(&state.db);
    let transaction = repo
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {id} not found")))?;
    let passes = repo.passes_for(id).await?;

    Ok(Json(TransactionDetailResponse {
        transaction: transaction.into(),
        passes: passes.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api, body_json, seeded_user};
    use axum::body::Body;
    use axum::http::{header, Request};
    use gp_core::pass::{PassGroup, PassType};
    use gp_core::{Contractor, Role, Store};
    use tower::ServiceExt;

    struct Fixture {
        contractor_id: Uuid,
        store_id: Uuid,
        monthly_id: Uuid,
        daily_id: Uuid,
    }

    async fn fixture(state: &crate::state::AppState) -> Fixture {
        let contractor = Contractor::new("Tx Worker", "TW0000001");
        gp_core::db::create_contractor_repository(&state.db)
            .create(&contractor)
            .await
            .unwrap();
        let store = Store::new("Tx Store");
        gp_core::db::create_store_repository(&state.db)
            .create(&store)
            .await
            .unwrap();
        let catalog = gp_core::db::create_pass_catalog_repository(&state.db);
        let group = PassGroup::new("All", 0);
        catalog.create_group(&group).await.unwrap();
        let monthly = PassType::new(group.id, "Monthly", 150_00, 30);
        let daily = PassType::new(group.id, "Daily", 10_00, 1);
        catalog.create_type(&monthly).await.unwrap();
        catalog.create_type(&daily).await.unwrap();

        Fixture {
            contractor_id: contractor.id,
            store_id: store.id,
            monthly_id: monthly.id,
            daily_id: daily.id,
        }
    }

    #[tokio::test]
    async fn create_totals_and_issues_passes() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;
        let fx = fixture(&state).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/transactions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "items": [
                                {"contractor_id": fx.contractor_id, "store_id": fx.store_id, "pass_type_id": fx.monthly_id},
                                {"contractor_id": fx.contractor_id, "store_id": fx.store_id, "pass_type_id": fx.daily_id}
                            ]
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let detail: TransactionDetailResponse = body_json(response).await;
        assert_eq!(detail.transaction.total_cents, 160_00);
        assert_eq!(detail.passes.len(), 2);
        assert!(detail.transaction.token.starts_with("T-"));

        // Detail endpoint returns the same passes
        let fetched = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/v1/transactions/{}", detail.transaction.id))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(fetched.status(), StatusCode::OK);
        let fetched: TransactionDetailResponse = body_json(fetched).await;
        assert_eq!(fetched.passes.len(), 2);
    }

    #[tokio::test]
    async fn bad_reference_fails_whole_bundle() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;
        let fx = fixture(&state).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/transactions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        serde_json::json!({
                            "items": [
                                {"contractor_id": fx.contractor_id, "store_id": fx.store_id, "pass_type_id": fx.monthly_id},
                                {"contractor_id": Uuid::new_v4(), "store_id": fx.store_id, "pass_type_id": fx.daily_id}
                            ]
                        })
                        .to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Nothing was written
        let list = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/transactions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let page: Paged<TransactionResponse> = body_json(list).await;
        assert_eq!(page.pagination.total_items, 0);
    }

    #[tokio::test]
    async fn empty_items_rejected() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "kassir1", Role::Cashier).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/transactions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"items": []}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn viewer_cannot_create() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "viewer", Role::Viewer).await;

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/transactions")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"items": []}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
