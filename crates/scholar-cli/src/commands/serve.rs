//! Serve command - starts the API server.

use anyhow::{Context, Result};
use colored::Colorize;
use std::net::SocketAddr;
use std::time::Duration;

use scholar_api::{ApiServer, ApiServerConfig, AppState};
use scholar_core::db::DbPool;
use scholar_core::TokenService;
use scholar_observability::{install_prometheus, record_pool_stats};
use tracing::warn;

use super::database::{open_database, seed_super_admin};
use crate::config::AppConfig;

const POOL_SAMPLE_INTERVAL: Duration = Duration::from_secs(15);

/// Runs the API server until Ctrl+C or SIGTERM.
pub async fn run_server(config: AppConfig) -> Result<()> {
    println!("{} Starting Scholar API Server...", "[server]".cyan());

    let db_pool = open_database(&config).await?;
    seed_super_admin(&db_pool, &config).await?;

    let tokens = TokenService::with_ttls(
        &config.auth.jwt_secret,
        config.auth.access_token_ttl_secs,
        config.auth.refresh_token_ttl_secs,
    );

    let mut state = AppState::new(db_pool.clone(), tokens);
    match install_prometheus() {
        Ok(handle) => state = state.with_prometheus_handle(handle),
        Err(e) => warn!(error = %e, "Prometheus recorder not installed, /metrics disabled"),
    }
    let sampler = tokio::spawn(sample_pool(db_pool));

    let bind_address: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid bind address")?;

    let server_config = ApiServerConfig {
        bind_address,
        enable_swagger: config.server.enable_swagger,
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
    };

    print_banner(&server_config, &config);

    let server = ApiServer::new(state, server_config);
    let outcome = server.run().await.context("Server error");
    sampler.abort();
    outcome?;

    println!();
    println!("{} Server stopped", "[server]".cyan());

    Ok(())
}

/// Publishes pool gauges until the task is aborted.
async fn sample_pool(pool: DbPool) {
    let mut ticker = tokio::time::interval(POOL_SAMPLE_INTERVAL);
    loop {
        ticker.tick().await;
        record_pool_stats(pool.pool_size(), pool.idle_connections());
    }
}

fn print_banner(server: &ApiServerConfig, config: &AppConfig) {
    let address = server.bind_address;

    println!();
    println!("{}", "Scholar API Server".bold());
    println!("{}", "═".repeat(40));
    println!("  {} http://{}", "Address:".cyan(), address);
    println!("  {} {}", "Database:".cyan(), config.database.url);
    println!(
        "  {} {}s",
        "Request timeout:".cyan(),
        server.request_timeout.as_secs()
    );

    if server.enable_swagger {
        println!("  {} http://{}/swagger-ui", "Swagger UI:".cyan(), address);
    }

    println!();
    println!("{}", "Endpoints:".bold());
    println!("  GET  /health                      - Health check");
    println!("  GET  /ready                       - Readiness probe");
    println!("  GET  /metrics                     - Prometheus metrics");
    println!("  POST /api/v1/auth/register        - Register a school");
    println!("  POST /api/v1/auth/login           - Log in");
    println!("  GET  /api/v1/dashboard            - Role dashboard");
    println!("  GET  /api/v1/students             - List students");
    println!("  GET  /api/v1/timetables           - List lessons");
    println!("  GET  /api/v1/notifications        - Inbox");
    println!();
    println!("Press {} to stop", "Ctrl+C".yellow());
    println!();
}
