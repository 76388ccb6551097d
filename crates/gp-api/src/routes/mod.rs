//! API routes.

pub mod auth;
pub mod catalog;
pub mod contractors;
pub mod directories;
pub mod health;
pub mod history;
pub mod metrics;
pub mod passes;
pub mod queue;
pub mod reports;
pub mod stores;
pub mod transactions;
pub mod users;

use crate::state::AppState;
use axum::Router;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes())
        .merge(health::routes())
        .merge(metrics::routes())
        .with_state(state)
}

/// Versioned resource routes.
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::routes())
        .nest("/admin/users", users::routes())
        .nest("/contractors", contractors::routes())
        .nest("/stores", stores::routes())
        .nest("/pass-groups", catalog::group_routes())
        .nest("/pass-types", catalog::type_routes())
        .nest("/passes", passes::routes())
        .nest("/transactions", transactions::routes())
        .nest("/queue", queue::routes())
        .nest("/directories", directories::routes())
        .nest("/reports", reports::routes())
        .nest("/history", history::routes())
}
