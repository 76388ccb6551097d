//! Application state shared across handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use gp_core::db::DbPool;
use gp_core::EventBus;

use crate::auth::{TokenAuthority, DEFAULT_TOKEN_TTL_MINUTES};
use crate::rate_limit::LoginRateLimiter;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DbPool>,
    /// Event bus feeding the queue WebSocket channel.
    pub event_bus: Arc<EventBus>,
    /// Token signer/verifier.
    pub auth: Arc<TokenAuthority>,
    /// Per-IP login throttling.
    pub login_rate_limiter: Arc<LoginRateLimiter>,
    /// Prometheus render handle for the /metrics endpoint.
    pub prometheus_handle: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates application state with the given JWT secret.
    pub fn new(db: DbPool, event_bus: EventBus, jwt_secret: &[u8]) -> Self {
        Self {
            db: Arc::new(db),
            event_bus: Arc::new(event_bus),
            auth: Arc::new(TokenAuthority::new(jwt_secret, DEFAULT_TOKEN_TTL_MINUTES)),
            login_rate_limiter: Arc::new(LoginRateLimiter::default()),
            prometheus_handle: None,
        }
    }

    /// Overrides the token authority (custom TTL).
    pub fn with_token_authority(mut self, authority: TokenAuthority) -> Self {
        self.auth = Arc::new(authority);
        self
    }

    /// Attaches a Prometheus handle for /metrics.
    pub fn with_prometheus_handle(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus_handle = Some(Arc::new(handle));
        self
    }
}
