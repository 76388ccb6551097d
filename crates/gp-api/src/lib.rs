//! # gp-api
//!
//! REST API server for Gatepass: resource routes, JWT bearer
//! authentication, the queue WebSocket channel, and the server harness.

pub mod auth;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::ApiError;
pub use server::{ApiServer, ApiServerConfig};
pub use state::AppState;
