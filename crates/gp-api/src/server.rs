//! API server harness.

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ErrorResponse;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::routes;
use crate::state::AppState;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address to bind to.
    pub bind_address: SocketAddr,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Mount Swagger UI at /swagger-ui.
    pub enable_swagger: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_timeout: Duration::from_secs(30),
            enable_swagger: true,
        }
    }
}

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::health::liveness_check,
        crate::routes::contractors::list_contractors,
        crate::routes::contractors::create_contractor,
        crate::routes::contractors::get_contractor,
        crate::routes::queue::list_tokens,
        crate::routes::queue::issue_token,
        crate::routes::queue::close_token,
    ),
    components(
        schemas(
            ErrorResponse,
            crate::dto::HealthResponse,
            crate::dto::DatabaseHealth,
            crate::dto::PageInfo,
            crate::routes::contractors::ContractorResponse,
            crate::routes::contractors::CreateContractorRequest,
            crate::routes::queue::QueueTokenResponse,
            crate::routes::queue::IssueTokenRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Contractors", description = "Contractor records"),
        (name = "Queue", description = "Service queue tokens and live updates"),
    ),
    info(
        title = "Gatepass API",
        version = "0.3.0",
        description = "Pass-management back office API",
        license(name = "MIT"),
    )
)]
pub struct ApiDoc;

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Creates a new API server.
    pub fn new(state: AppState, config: ApiServerConfig) -> Self {
        Self { config, state }
    }

    /// Creates a server with default configuration.
    pub fn with_state(state: AppState) -> Self {
        Self::new(state, ApiServerConfig::default())
    }

    /// Builds the router with all middleware applied.
    pub fn router(&self) -> Router {
        routes::health::init_start_time();

        let mut app = routes::create_router(self.state.clone());

        if self.config.enable_swagger {
            app = app.merge(
                SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()),
            );
        }

        app.layer(middleware::from_fn(security_headers))
            .layer(middleware::from_fn(request_logging))
            .layer(middleware::from_fn(request_id))
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(self.config.request_timeout))
            .layer(cors_layer())
            .layer(CatchPanicLayer::new())
    }

    /// Runs the server until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let addr = self.config.bind_address;
        let app = self.router();

        info!("Starting API server on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        info!("API server shut down");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
