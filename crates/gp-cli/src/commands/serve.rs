//! Serve command: runs migrations, seeds, and starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;

use gp_api::auth::TokenAuthority;
use gp_api::{ApiServer, ApiServerConfig, AppState};
use gp_core::db::{
    create_pool_with_options, ensure_admin_user, run_migrations, seed_directories, PoolOptions,
};
use gp_core::EventBus;
use gp_observability::install_prometheus_recorder;

use crate::config::AppConfig;

/// Server settings resolved from CLI arguments and the config file.
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub enable_swagger: bool,
    pub request_timeout_secs: u64,
}

/// Runs the API server until shutdown.
pub async fn run_server(serve: ServeConfig, app_config: AppConfig) -> Result<()> {
    println!("{} Starting Gatepass API server...", "[server]".cyan());

    println!("  {} Database: {}", "→".green(), serve.database_url);
    let pool = create_pool_with_options(
        &serve.database_url,
        PoolOptions {
            max_connections: app_config.database.max_connections,
            ..PoolOptions::default()
        },
    )
    .await
    .context("Failed to create database pool")?;

    println!("  {} Running migrations...", "→".green());
    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    if let Some(password) = ensure_admin_user(&pool)
        .await
        .context("Failed to seed admin user")?
    {
        println!();
        println!(
            "  {} Created initial admin user '{}' with password: {}",
            "!".yellow().bold(),
            "admin".bold(),
            password.bold()
        );
        println!("    Change it after first login.");
        println!();
    }

    let seeded = seed_directories(&pool)
        .await
        .context("Failed to seed directories")?;
    if seeded > 0 {
        println!("  {} Seeded {seeded} directory entries", "→".green());
    }

    let event_bus = EventBus::new(1024);

    let mut state = AppState::new(pool, event_bus, app_config.auth.jwt_secret.as_bytes())
        .with_token_authority(TokenAuthority::new(
            app_config.auth.jwt_secret.as_bytes(),
            app_config.auth.token_ttl_minutes,
        ));

    if let Some(handle) = install_prometheus_recorder() {
        state = state.with_prometheus_handle(handle);
    }

    let bind_address: SocketAddr = format!("{}:{}", serve.host, serve.port)
        .parse()
        .context("Invalid bind address")?;

    let server_config = ApiServerConfig {
        bind_address,
        request_timeout: Duration::from_secs(serve.request_timeout_secs),
        enable_swagger: serve.enable_swagger,
    };

    println!();
    println!("{}", "Gatepass API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), bind_address);
    if serve.enable_swagger {
        println!("  {} http://{}/swagger-ui", "Swagger UI:".cyan(), bind_address);
    }
    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /health                        - Health check");
    println!("  POST /api/v1/auth/login             - Login");
    println!("  GET  /api/v1/contractors            - List contractors");
    println!("  GET  /api/v1/stores                 - List stores");
    println!("  POST /api/v1/transactions           - Create transaction");
    println!("  GET  /api/v1/queue/tokens           - List queue tokens");
    println!("  GET  /api/v1/queue/ws               - Queue updates (WebSocket)");
    println!("  GET  /metrics                       - Prometheus metrics");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();

    let server = ApiServer::new(state, server_config);
    server.run().await.context("Server error")?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}
