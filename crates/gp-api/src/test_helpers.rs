//! Shared test helpers for the gp-api crate.

use axum::extract::connect_info::MockConnectInfo;
use axum::response::Response;
use axum::Router;
use std::net::SocketAddr;
use uuid::Uuid;

use gp_core::db::{create_pool_with_options, create_user_repository, run_migrations, PoolOptions};
use gp_core::{hash_password, EventBus, Role, User};

use crate::routes::create_router;
use crate::state::AppState;

/// JWT secret used across API tests.
pub(crate) const TEST_JWT_SECRET: &[u8] = b"gatepass-test-secret-0123456789abcdef";

/// Password every seeded test user gets.
pub(crate) const TEST_PASSWORD: &str = "Password1";

/// Creates app state over a fresh in-memory SQLite database.
///
/// Each call uses a uniquely named shared-cache memory database with a
/// single connection, so parallel tests stay isolated and every
/// connection sees the migrated schema.
pub(crate) async fn test_state() -> AppState {
    let url = format!(
        "sqlite:file:test_api_{}?mode=memory&cache=shared",
        Uuid::new_v4()
    );
    let pool = create_pool_with_options(
        &url,
        PoolOptions {
            max_connections: 1,
            min_connections: 1,
            ..PoolOptions::default()
        },
    )
    .await
    .expect("Failed to create test pool");

    run_migrations(&pool).await.expect("Migrations failed");

    AppState::new(pool, EventBus::new(64), TEST_JWT_SECRET)
}

/// Builds the full API router over a fresh state.
pub(crate) async fn api() -> (Router, AppState) {
    let state = test_state().await;
    (api_with_connect_info(state.clone()), state)
}

/// Wraps the router with a mock peer address so handlers using
/// `ConnectInfo` work under `oneshot`.
pub(crate) fn api_with_connect_info(state: AppState) -> Router {
    create_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 52000))))
}

/// Creates a user with [`TEST_PASSWORD`] and returns it with a valid
/// bearer token.
pub(crate) async fn seeded_user(state: &AppState, username: &str, role: Role) -> (User, String) {
    let password_hash = hash_password(TEST_PASSWORD).expect("hashing failed");
    let user = User::new(
        username,
        format!("{username}@example.com"),
        password_hash,
        role,
    );
    create_user_repository(&state.db)
        .create(&user)
        .await
        .expect("Failed to seed user");

    let token = state.auth.issue(&user).expect("Failed to issue token");
    (user, token)
}

/// Deserializes a response body as JSON.
pub(crate) async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        panic!(
            "Failed to parse body: {e}: {}",
            String::from_utf8_lossy(&bytes)
        )
    })
}
