//! Web server module for the IPN listener.
//!
//! Exposes the listener route at the resolved path and a health probe.
//! The listener answers 200 for every callback it accepted, valid or not;
//! the trust decision travels to subscribers, not back to the gateway.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{
    health, ipn_listener, AppState, HealthResponse, INVALID_ACK, MAX_BODY_BYTES, VALID_ACK,
};

/// Build the application router with the listener mounted at `listener_path`.
pub fn router(state: AppState, listener_path: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(listener_path, post(ipn_listener))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
