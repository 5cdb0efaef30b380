//! Traffic Relay - live traffic simulation fan-out server
//!
//! This is the main entry point for the relay. It handles:
//! - A resilient ingest connection to the simulation engine's event stream
//! - WebSocket sessions that receive the latest state at a bounded rate
//! - Forwarding of viewer control commands back to the engine
//! - HTTP endpoints for the road map, health and control status

mod app;
mod broadcast;
mod config;
mod control;
mod http;
mod model;
mod upstream;
mod util;
mod ws;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Traffic Relay");
    info!("Server address: {}", config.server_addr);
    info!("Upstream engine: {}", config.upstream_url);

    // Create application state
    let (state, services) = AppState::new(config.clone())?;

    // Spawn the single upstream connector
    let connector_task = tokio::spawn(services.connector.run());
    let forwarder_task = services.forwarder;

    // Build router
    let router = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let broadcaster = state.broadcaster.clone();
    let connector_abort = connector_task.abort_handle();
    let forwarder_abort = forwarder_task.abort_handle();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Drop the upstream stream and release every viewer so open
            // WebSockets do not hold the server up
            connector_abort.abort();
            forwarder_abort.abort();
            broadcaster.close_all();
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
