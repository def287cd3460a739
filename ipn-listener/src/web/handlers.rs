//! IPN listener endpoint handlers.
//!
//! The listener:
//! 1. Checks the enabled gate (401 before touching the body)
//! 2. Decodes the callback
//! 3. Confirms it with the gateway
//! 4. Dispatches the classified event
//! 5. Acknowledges with 200 either way
//!
//! Steps 2-4 run in a spawned task, inside the request span, so a caller
//! hanging up mid-request does not cancel the postback or the dispatch.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn, Instrument, Span};

use crate::config::{ConfigProvider, GatewayConfig};
use crate::ipn::{CallbackMessage, Dispatcher, IpnEvent, VerificationOutcome, Verifier};

/// Acknowledgement for a callback the gateway confirmed.
pub const VALID_ACK: &str = "Got valid IPN data";

/// Acknowledgement for everything else, including postback failures.
pub const INVALID_ACK: &str = "Got invalid IPN data";

/// Largest callback body accepted. IPN bodies are a few kilobytes.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<dyn ConfigProvider>,
    pub verifier: Arc<dyn Verifier>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(
        config: Arc<dyn ConfigProvider>,
        verifier: Arc<dyn Verifier>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config,
            verifier,
            dispatcher: Arc::new(dispatcher),
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// IPN Listener
// =============================================================================

/// IPN listener endpoint.
pub async fn ipn_listener(State(state): State<AppState>, body: Body) -> Response {
    let config = state.config.snapshot();

    if !config.listener_enabled {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, max_bytes = MAX_BODY_BYTES, "ipn_body_read_failed");
            Bytes::new()
        }
    };

    let task = process_callback(state, config, body).instrument(Span::current());

    let valid = match tokio::spawn(task).await {
        Ok(valid) => valid,
        Err(e) => {
            error!(error = %e, "ipn_processing_aborted");
            false
        }
    };

    let ack = if valid { VALID_ACK } else { INVALID_ACK };
    (StatusCode::OK, ack).into_response()
}

/// Decode, verify and dispatch one callback. Returns whether it was valid.
async fn process_callback(state: AppState, config: GatewayConfig, body: Bytes) -> bool {
    let message = match CallbackMessage::try_decode(&body) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, body_length = body.len(), "ipn_decode_failed");
            CallbackMessage::default()
        }
    };

    if config.logging_enabled {
        let fields = serde_json::to_string(&message.pairs()).unwrap_or_default();
        info!(
            mode = %config.mode,
            field_count = message.len(),
            fields = %fields,
            "ipn_message_received"
        );
    }

    let outcome = state.verifier.verify(&message, config.mode).await;

    match &outcome {
        VerificationOutcome::Valid => info!(
            mode = %config.mode,
            txn_id = message.txn_id().unwrap_or(""),
            "ipn_verified"
        ),
        VerificationOutcome::Invalid => warn!(
            mode = %config.mode,
            txn_id = message.txn_id().unwrap_or(""),
            "ipn_rejected"
        ),
        VerificationOutcome::Error(e) => error!(
            mode = %config.mode,
            txn_id = message.txn_id().unwrap_or(""),
            error = %e,
            "ipn_verification_failed"
        ),
    }

    let event = IpnEvent::new(message, outcome);
    state.dispatcher.dispatch(&event).await;

    event.is_valid()
}
