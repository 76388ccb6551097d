//! Service queue routes and the live update channel.
//!
//! Tokens are issued and closed over plain REST; every change is pushed
//! to connected clients through `/queue/ws`. The WebSocket carries
//! notifications only: clients refetch the token list when an event
//! arrives, and refetch on reconnect to cover anything missed while
//! offline.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use gp_core::db::{create_history_repository, create_queue_repository};
use gp_core::queue::{QueueToken, QueueTokenFilter, TokenStatus};
use gp_core::{BackofficeEvent, EntityKind, HistoryAction, HistoryEntry};
use gp_observability::metrics::names;

use crate::auth::{bearer_token, AuthenticatedUser, RequireCashier};
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the queue routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tokens", get(list_tokens))
        .route("/tokens", post(issue_token))
        .route("/tokens/:id", get(get_token))
        .route("/tokens/:id/close", post(close_token))
        .route("/ws", get(queue_ws))
}

/// A queue token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QueueTokenResponse {
    pub id: Uuid,
    pub number: i64,
    pub kind: String,
    pub issued_by: Uuid,
    pub status: String,
    pub created_at: String,
    pub closed_at: Option<String>,
    pub closed_by: Option<Uuid>,
}

impl From<QueueToken> for QueueTokenResponse {
    fn from(t: QueueToken) -> Self {
        Self {
            id: t.id,
            number: t.number,
            kind: t.kind,
            issued_by: t.issued_by,
            status: t.status.as_str().to_string(),
            created_at: t.created_at.to_rfc3339(),
            closed_at: t.closed_at.map(|c| c.to_rfc3339()),
            closed_by: t.closed_by,
        }
    }
}

/// Request to issue a queue token.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueTokenRequest {
    /// Service kind the token queues for, e.g. "passes" or "payments".
    #[validate(length(min = 1, max = 50, message = "Token kind is required"))]
    pub kind: String,
}

/// Query parameters for listing tokens.
#[derive(Debug, Deserialize)]
pub struct ListTokensQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    /// Only tokens issued by the caller.
    pub mine: Option<bool>,
    /// Only tokens created today.
    pub today: Option<bool>,
}

/// Lists queue tokens.
///
/// `mine=true&status=active` is the "do I hold an active token" check
/// clients run after every queue event.
#[utoipa::path(
    get,
    path = "/api/v1/queue/tokens",
    responses((status = 200, description = "Queue tokens", body = [QueueTokenResponse])),
    tag = "Queue"
)]
pub async fn list_tokens(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<ListTokensQuery>,
) -> Result<Json<Vec<QueueTokenResponse>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<TokenStatus>()
                .map_err(|_| ApiError::BadRequest(format!("Invalid token status: {s}")))
        })
        .transpose()?;

    let filter = QueueTokenFilter {
        status,
        kind: query.kind,
        issued_by: query.mine.unwrap_or(false).then_some(user.id),
        today_only: query.today.unwrap_or(false),
    };

    let tokens = create_queue_repository(&state.db).list(&filter).await?;
    Ok(Json(tokens.into_iter().map(Into::into).collect()))
}

/// Issues a queue token and broadcasts the change.
#[utoipa::path(
    post,
    path = "/api/v1/queue/tokens",
    request_body = IssueTokenRequest,
    responses(
        (status = 201, description = "Token issued", body = QueueTokenResponse),
        (status = 409, description = "Caller already holds an active token of this kind")
    ),
    tag = "Queue"
)]
pub async fn issue_token(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Json(request): Json<IssueTokenRequest>,
) -> Result<(StatusCode, Json<QueueTokenResponse>), ApiError> {
    request.validate()?;

    let kind = request.kind.trim();
    if kind.is_empty() {
        return Err(ApiError::validation_field("kind", "Token kind is required"));
    }

    let token = QueueToken::new(kind, user.id);
    let issued = create_queue_repository(&state.db).issue(&token).await?;

    metrics::counter!(names::QUEUE_TOKENS_ISSUED).increment(1);
    info!(
        actor = %user.username,
        number = issued.number,
        kind = %issued.kind,
        "Queue token issued"
    );

    if let Err(e) = create_history_repository(&state.db)
        .record(&HistoryEntry::new(
            EntityKind::QueueToken,
            issued.id,
            HistoryAction::Created,
            &user.username,
        ))
        .await
    {
        warn!(error = %e, "Failed to record queue history");
    }

    state
        .event_bus
        .publish(BackofficeEvent::QueueTokenIssued {
            token: issued.clone(),
        })
        .await;

    Ok((StatusCode::CREATED, Json(issued.into())))
}

/// Gets a queue token by id.
async fn get_token(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueTokenResponse>, ApiError> {
    let token = create_queue_repository(&state.db)
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Queue token {id} not found")))?;
    Ok(Json(token.into()))
}

/// Closes an active queue token and broadcasts the change.
#[utoipa::path(
    post,
    path = "/api/v1/queue/tokens/{id}/close",
    responses(
        (status = 200, description = "Token closed", body = QueueTokenResponse),
        (status = 409, description = "Token is already closed")
    ),
    tag = "Queue"
)]
pub async fn close_token(
    State(state): State<AppState>,
    RequireCashier(user): RequireCashier,
    Path(id): Path<Uuid>,
) -> Result<Json<QueueTokenResponse>, ApiError> {
    let closed = create_queue_repository(&state.db).close(id, user.id).await?;

    metrics::counter!(names::QUEUE_TOKENS_CLOSED).increment(1);
    info!(
        actor = %user.username,
        number = closed.number,
        kind = %closed.kind,
        "Queue token closed"
    );

    if let Err(e) = create_history_repository(&state.db)
        .record(&HistoryEntry::new(
            EntityKind::QueueToken,
            id,
            HistoryAction::Closed,
            &user.username,
        ))
        .await
    {
        warn!(error = %e, "Failed to record queue history");
    }

    state
        .event_bus
        .publish(BackofficeEvent::QueueTokenClosed {
            token_id: closed.id,
            number: closed.number,
            kind: closed.kind.clone(),
            closed_by: user.id,
        })
        .await;

    Ok(Json(closed.into()))
}

/// Query parameters for the WebSocket upgrade.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token; browsers cannot set headers on WebSocket upgrades.
    pub token: Option<String>,
}

/// Upgrades to the queue notification channel.
///
/// Authentication accepts the Authorization header or `?token=`. The
/// connection only pushes server events; client frames other than
/// close/ping are ignored.
async fn queue_ws(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;

    let claims = state.auth.verify(&token)?;

    debug!(username = %claims.username, "Queue WebSocket authenticated");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims.username)))
}

/// Forwards queue events to one connected client until it goes away.
async fn handle_socket(socket: WebSocket, state: AppState, username: String) {
    metrics::gauge!(names::WS_CONNECTIONS).increment(1.0);
    info!(username = %username, "Queue WebSocket connected");

    let mut events = state.event_bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) if event.is_queue_event() => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sink.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // The client resynchronizes by refetching; just note
                    // the gap and keep streaming.
                    warn!(username = %username, missed, "Queue WebSocket lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(username = %username, error = %e, "Queue WebSocket error");
                    break;
                }
            },
        }
    }

    metrics::gauge!(names::WS_CONNECTIONS).decrement(1.0);
    info!(username = %username, "Queue WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api, body_json, seeded_user};
    use axum::body::Body;
    use axum::http::{header, Request};
    use gp_core::Role;
    use tower::ServiceExt;

    async fn issue(app: &Router, token: &str, kind: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/queue/tokens")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({"kind": kind}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn close(app: &Router, token: &str, id: Uuid) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/queue/tokens/{id}/close"))
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn issue_assigns_sequential_numbers() {
        let (app, state) = api().await;
        let (_, alice) = seeded_user(&state, "alice", Role::Cashier).await;
        let (_, bob) = seeded_user(&state, "bob", Role::Cashier).await;

        let first: QueueTokenResponse = body_json(issue(&app, &alice, "passes").await).await;
        let second: QueueTokenResponse = body_json(issue(&app, &bob, "passes").await).await;

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(first.status, "active");
    }

    #[tokio::test]
    async fn double_issue_same_kind_conflicts() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "alice", Role::Cashier).await;

        assert_eq!(issue(&app, &token, "passes").await.status(), StatusCode::CREATED);
        assert_eq!(issue(&app, &token, "passes").await.status(), StatusCode::CONFLICT);
        // Another service kind is allowed
        assert_eq!(issue(&app, &token, "payments").await.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn close_is_single_shot_and_stamps_closer() {
        let (app, state) = api().await;
        let (_, alice) = seeded_user(&state, "alice", Role::Cashier).await;
        let (clerk, clerk_token) = seeded_user(&state, "clerk", Role::Cashier).await;

        let issued: QueueTokenResponse = body_json(issue(&app, &alice, "passes").await).await;

        let first = close(&app, &clerk_token, issued.id).await;
        assert_eq!(first.status(), StatusCode::OK);
        let closed: QueueTokenResponse = body_json(first).await;
        assert_eq!(closed.status, "closed");
        assert_eq!(closed.closed_by, Some(clerk.id));

        let second = close(&app, &clerk_token, issued.id).await;
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn mine_filter_scopes_to_caller() {
        let (app, state) = api().await;
        let (_, alice) = seeded_user(&state, "alice", Role::Cashier).await;
        let (_, bob) = seeded_user(&state, "bob", Role::Cashier).await;

        issue(&app, &alice, "passes").await;
        issue(&app, &bob, "passes").await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queue/tokens?mine=true&status=active")
                    .header(header::AUTHORIZATION, format!("Bearer {alice}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let tokens: Vec<QueueTokenResponse> = body_json(response).await;
        assert_eq!(tokens.len(), 1);
    }

    #[tokio::test]
    async fn issue_and_close_broadcast_events() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "alice", Role::Cashier).await;

        let mut rx = state.event_bus.subscribe();

        let issued: QueueTokenResponse = body_json(issue(&app, &token, "passes").await).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "queue_token_issued");

        close(&app, &token, issued.id).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "queue_token_closed");

        // The wire format carries the type tag WebSocket clients dispatch on
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"queue_token_closed\""));
    }

    #[tokio::test]
    async fn ws_without_token_is_unauthorized() {
        let (app, _state) = api().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/queue/ws")
                    .header(header::CONNECTION, "upgrade")
                    .header(header::UPGRADE, "websocket")
                    .header(header::SEC_WEBSOCKET_VERSION, "13")
                    .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
