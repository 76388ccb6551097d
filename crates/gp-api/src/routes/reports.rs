//! Report routes.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use gp_core::db::{
    create_report_repository, ExpiringPass, PassTypeRevenue, SummaryReport,
};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Creates the report routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/revenue-by-pass-type", get(revenue_by_pass_type))
        .route("/expiring-passes", get(expiring_passes))
}

/// Date-range query shared by the period reports. Defaults to the last
/// 30 days.
#[derive(Debug, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl PeriodQuery {
    fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), ApiError> {
        let until = self.to.unwrap_or_else(Utc::now);
        let from = self.from.unwrap_or(until - chrono::Duration::days(30));

        if from >= until {
            return Err(ApiError::BadRequest(
                "'from' must be earlier than 'to'".to_string(),
            ));
        }
        Ok((from, until))
    }
}

/// Query for the expiring-passes report.
#[derive(Debug, Deserialize)]
pub struct ExpiringQuery {
    pub within_days: Option<u32>,
}

/// Period totals: transactions, revenue, passes, served queue tokens.
async fn summary(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<SummaryReport>, ApiError> {
    let (from, until) = query.resolve()?;
    let report = create_report_repository(&state.db)
        .summary(from, until)
        .await?;
    Ok(Json(report))
}

/// Revenue grouped by pass type.
async fn revenue_by_pass_type(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<PeriodQuery>,
) -> Result<Json<Vec<PassTypeRevenue>>, ApiError> {
    let (from, until) = query.resolve()?;
    let rows = create_report_repository(&state.db)
        .revenue_by_pass_type(from, until)
        .await?;
    Ok(Json(rows))
}

/// Open passes ending within the window (default 7 days).
async fn expiring_passes(
    State(state): State<AppState>,
    AuthenticatedUser(_user): AuthenticatedUser,
    Query(query): Query<ExpiringQuery>,
) -> Result<Json<Vec<ExpiringPass>>, ApiError> {
    let within_days = query.within_days.unwrap_or(7).min(366);
    let rows = create_report_repository(&state.db)
        .expiring_passes(Utc::now().date_naive(), within_days)
        .await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{api, body_json, seeded_user};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use gp_core::Role;
    use tower::ServiceExt;

    #[tokio::test]
    async fn summary_on_empty_database_is_zeros() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "viewer", Role::Viewer).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/reports/summary")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report: SummaryReport = body_json(response).await;
        assert_eq!(report.transactions, 0);
        assert_eq!(report.revenue_cents, 0);
        assert_eq!(report.passes_issued, 0);
        assert_eq!(report.tokens_served, 0);
    }

    #[tokio::test]
    async fn inverted_range_is_bad_request() {
        let (app, state) = api().await;
        let (_, token) = seeded_user(&state, "viewer", Role::Viewer).await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/reports/summary?from=2024-06-01T00:00:00Z&to=2024-05-01T00:00:00Z")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reports_require_authentication() {
        let (app, _state) = api().await;

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/reports/summary")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
