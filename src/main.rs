use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use chinook_admin_backend::api::handlers::connection::AppState;
use chinook_admin_backend::api::routes::create_router;
use chinook_admin_backend::config::Config;
use chinook_admin_backend::logging;
use chinook_admin_backend::services::{ConnectionPoolManager, ConnectionRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init(&config.logging);

    let registry = ConnectionRegistry::load(&config.connections_file(), &config.connections.default)
        .map_err(|e| {
            error!("Failed to load connection profiles: {}", e);
            e
        })?;
    info!(
        "{} connection profiles available, default '{}'",
        registry.len().await,
        registry.default_name().await
    );

    let pool_manager = ConnectionPoolManager::with_config(
        config.pool.max_size,
        Duration::from_secs(config.query.timeout_secs),
    );
    if config.query.read_only {
        info!("Raw query endpoint is read-only");
    }

    let addr: SocketAddr = config.server_address().parse()?;
    let state = AppState::new(config, Arc::new(registry), Arc::new(pool_manager));
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
