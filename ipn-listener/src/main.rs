//! IPN Listener - web server receiving PayPal Instant Payment Notifications.
//!
//! Every callback is confirmed with the gateway before the classified event
//! is handed to subscribers. The listener path is resolved once at startup;
//! the enabled gate, mode and field logging are re-read per request.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ipn_listener::{
    resolve_listener_path, router, AppState, Config, Dispatcher, EnvConfigProvider, EventLogger,
    VerificationClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("ipn_listener_starting");

    // Load configuration
    let config = Config::from_env();
    let listener_path = resolve_listener_path(&config.gateway);
    info!(
        port = config.port,
        mode = %config.gateway.mode,
        listener_enabled = config.gateway.listener_enabled,
        listener_path = %listener_path,
        logging_enabled = config.gateway.logging_enabled,
        verify_timeout_ms = config.verify_timeout_ms,
        "config_loaded"
    );

    let verifier = VerificationClient::new(config.verify_timeout())
        .context("Failed to create HTTP client")?;

    let dispatcher = Dispatcher::new().subscribe(Arc::new(EventLogger));
    info!(subscribers = dispatcher.len(), "dispatcher_ready");

    let state = AppState::new(Arc::new(EnvConfigProvider), Arc::new(verifier), dispatcher);
    let app = router(state, &listener_path);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, listener_path = %listener_path, "web_server_listening");

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
