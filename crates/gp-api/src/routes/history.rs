//! Change history routes.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use gp_core::db::{create_history_repository, PageRequest};
use gp_core::{EntityKind, HistoryEntry, HistoryFilter};

use crate::auth::AuthenticatedUser;
use crate::dto::Paged;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the history routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_history))
}

/// Query parameters for listing history.
#[derive(Debug, Deserialize)]
pub struct ListHistoryQuery {
    pub entity_kind: Option<String>,
    pub entity_id: Option<Uuid>,
    pub actor: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// A history entry.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HistoryEntryResponse {
    pub id: Uuid,
    pub entity_kind: String,
    pub entity_id: Uuid,
    pub action: String,
    pub actor: String,
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

impl From<HistoryEntry> for HistoryEntryResponse {
    fn from(e: HistoryEntry) -> Self {
        Self {
            id: e.id,
            entity_kind: e.entity_kind.as_str().to_string(),
            entity_id: e.entity_id,
            action: e.action.as_str().to_string(),
            actor: e.actor,
            details: e.details,
            created_at: e.created_at.to_rfc3339(),
        }
    }
}

/// Lists history entries, newest first.
async fn list_history(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ListHistoryQuery>,
) -> Result<Json<Paged<HistoryEntryResponse>>, ApiError> {
    let entity_kind = query
        .entity_kind
        .as_deref()
        .map(|s| {
            s.parse::<EntityKind>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid entity kind: {s}")))
        })
        .transpose()?;

    let filter = HistoryFilter {
        entity_kind,
        entity_id: query.entity_id,
        actor: query.actor,
        since: query.since,
        until: query.until,
    };
    let page = PageRequest::from_query(query.page, query.per_page);

    let result = create_history_repository(&state.db)
        .list(&filter, &page)
        .await?;
    Ok(Json(Paged::from_page(result, Into::into)))
}
