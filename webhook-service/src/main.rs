//! Stripe webhook server.
//!
//! Receives the events that `stripe listen --forward-to <host>/webhook`
//! forwards, verifies their signatures and keeps the most recent ones in
//! an event log that the operator can list and clear.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stripe_webhooks::event::log_outcome;
use stripe_webhooks::{router, AppState, Config, JsonFileStore, KeyValueStore, MemoryStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_secret_configured = config.webhook_secret.is_some(),
        tolerance_seconds = config.webhook_tolerance.map(|t| t.as_secs()),
        event_log_capacity = config.event_log_capacity,
        data_dir = ?config.data_dir,
        admin_token_configured = config.admin_token.is_some(),
        "config_loaded"
    );

    let store: Arc<dyn KeyValueStore> = match &config.data_dir {
        Some(dir) => {
            Arc::new(JsonFileStore::open(dir).context("Failed to open data directory")?)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let port = config.port;
    let state = AppState::new(config, store).context("Failed to load event log")?;
    state.hooks.on_event(log_outcome);

    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
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
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
