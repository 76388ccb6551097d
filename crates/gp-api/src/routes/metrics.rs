//! Prometheus metrics endpoint.

use axum::{extract::State, routing::get, Router};

use crate::error::ApiError;
use crate::state::AppState;

/// Creates the metrics routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(prometheus_metrics))
}

/// Renders Prometheus text exposition format.
async fn prometheus_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    match &state.prometheus_handle {
        Some(handle) => Ok(handle.render()),
        None => Err(ApiError::NotFound(
            "Metrics exporter is not configured".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn missing_recorder_is_not_found() {
        let state = test_state().await;
        let app = Router::new().merge(routes()).with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
