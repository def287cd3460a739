//! Gateway postback verification.
//!
//! Every callback is replayed to the gateway, prefixed with
//! `cmd=_notify-validate`. The gateway answers `VERIFIED` when it sent the
//! message and `INVALID` otherwise. One attempt per callback, no retries:
//! the gateway redelivers callbacks on its own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client};
use thiserror::Error;
use tracing::{debug, info};

use super::message::CallbackMessage;
use crate::gateway::GatewayMode;

/// Synthetic field prepended to every postback.
pub const VALIDATE_COMMAND: &str = "cmd=_notify-validate";

/// Gateway reply for an authentic message.
pub const VERIFIED_BODY: &str = "VERIFIED";

/// Gateway reply for a spoofed or altered message.
pub const INVALID_BODY: &str = "INVALID";

/// The gateway refuses postbacks without a user agent.
const USER_AGENT: &str = concat!("ipn-listener/", env!("CARGO_PKG_VERSION"));

/// Why a postback could not produce a verdict.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("postback timed out after {0:?}")]
    Timeout(Duration),

    #[error("postback failed: {0}")]
    Network(String),

    #[error("gateway returned HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("gateway returned unexpected body: {0:?}")]
    UnexpectedBody(String),
}

/// Result of one confirmation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Valid,
    Invalid,
    Error(VerifyError),
}

impl VerificationOutcome {
    /// Only `Valid` is trusted; errors are treated like `Invalid`.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationOutcome::Valid)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Valid => "valid",
            VerificationOutcome::Invalid => "invalid",
            VerificationOutcome::Error(_) => "error",
        }
    }
}

/// Anything that can confirm a callback with the gateway.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, message: &CallbackMessage, mode: GatewayMode) -> VerificationOutcome;
}

/// Build the postback body: the validate command, then every raw field.
pub fn postback_payload(message: &CallbackMessage) -> String {
    let mut payload = String::from(VALIDATE_COMMAND);
    for field in message.fields() {
        payload.push('&');
        payload.push_str(&field.raw);
    }
    payload
}

/// Map a gateway reply to an outcome.
pub fn classify_reply(status: u16, body: &str) -> VerificationOutcome {
    if !(200..300).contains(&status) {
        return VerificationOutcome::Error(VerifyError::UnexpectedStatus(status));
    }

    match body {
        VERIFIED_BODY => VerificationOutcome::Valid,
        INVALID_BODY => VerificationOutcome::Invalid,
        other => VerificationOutcome::Error(VerifyError::UnexpectedBody(
            other.chars().take(200).collect(),
        )),
    }
}

/// HTTP postback client.
#[derive(Clone)]
pub struct VerificationClient {
    client: Client,
    timeout: Duration,
}

impl VerificationClient {
    /// Create a client with its own connection pool.
    ///
    /// Redirects are not followed: a 3xx from the gateway is an unexpected
    /// status, and following it would send a second request without the
    /// replayed fields.
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client, timeout))
    }

    /// Wrap an existing `reqwest::Client`. It should not follow redirects.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Post the message to an explicit endpoint and classify the reply.
    pub async fn verify_at(&self, message: &CallbackMessage, endpoint: &str) -> VerificationOutcome {
        let payload = postback_payload(message);

        debug!(
            endpoint = endpoint,
            field_count = message.len(),
            payload_length = payload.len(),
            "postback_starting"
        );

        let response = self
            .client
            .post(endpoint)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(payload)
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => return VerificationOutcome::Error(self.map_transport_error(&e)),
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return VerificationOutcome::Error(self.map_transport_error(&e)),
        };

        let outcome = classify_reply(status, &body);

        info!(
            endpoint = endpoint,
            status_code = status,
            outcome = outcome.as_str(),
            "postback_complete"
        );

        outcome
    }

    fn map_transport_error(&self, e: &reqwest::Error) -> VerifyError {
        if e.is_timeout() {
            VerifyError::Timeout(self.timeout)
        } else {
            VerifyError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Verifier for VerificationClient {
    async fn verify(&self, message: &CallbackMessage, mode: GatewayMode) -> VerificationOutcome {
        self.verify_at(message, mode.endpoint()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::{
        extract::State,
        http::{header as http_header, HeaderMap, Method, StatusCode, Uri},
        response::{IntoResponse, Response},
        Router,
    };
    use tokio::net::TcpListener;

    const WEBSCR_PATH: &str = "/cgi-bin/webscr";

    /// One request as seen by the stand-in gateway.
    #[derive(Debug, Clone)]
    struct Hit {
        method: Method,
        path: String,
        content_type: String,
        user_agent: String,
        body: String,
    }

    /// Stand-in gateway: records every request it sees. The webscr path
    /// answers with a fixed status/body after an optional delay, plus a
    /// `Location` header when configured. Every other path answers
    /// `VERIFIED`.
    #[derive(Clone)]
    struct FakeGateway {
        hits: Arc<Mutex<Vec<Hit>>>,
        status: StatusCode,
        reply: &'static str,
        delay: Duration,
        location: Option<&'static str>,
    }

    fn header_value(headers: &HeaderMap, name: http_header::HeaderName) -> String {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    }

    async fn gateway(
        State(gw): State<FakeGateway>,
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: String,
    ) -> Response {
        gw.hits.lock().unwrap().push(Hit {
            method,
            path: uri.path().to_string(),
            content_type: header_value(&headers, http_header::CONTENT_TYPE),
            user_agent: header_value(&headers, http_header::USER_AGENT),
            body,
        });

        if uri.path() != WEBSCR_PATH {
            return (StatusCode::OK, VERIFIED_BODY).into_response();
        }

        tokio::time::sleep(gw.delay).await;
        match gw.location {
            Some(location) => {
                (gw.status, [(http_header::LOCATION, location)], gw.reply).into_response()
            }
            None => (gw.status, gw.reply).into_response(),
        }
    }

    async fn start_gateway(gw: FakeGateway) -> String {
        let app = Router::new().fallback(gateway).with_state(gw);

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}{}", addr, WEBSCR_PATH)
    }

    async fn spawn_gateway(
        status: StatusCode,
        reply: &'static str,
        delay: Duration,
    ) -> (String, Arc<Mutex<Vec<Hit>>>) {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let url = start_gateway(FakeGateway {
            hits: hits.clone(),
            status,
            reply,
            delay,
            location: None,
        })
        .await;
        (url, hits)
    }

    fn client(timeout: Duration) -> VerificationClient {
        VerificationClient::new(timeout).unwrap()
    }

    #[test]
    fn test_postback_payload_prepends_command() {
        let msg = CallbackMessage::decode(b"txn_id=1&payer_email=a%40b.com&memo=x+y");
        assert_eq!(
            postback_payload(&msg),
            "cmd=_notify-validate&txn_id=1&payer_email=a%40b.com&memo=x+y"
        );
    }

    #[test]
    fn test_postback_payload_field_order() {
        let msg = CallbackMessage::decode(b"z=1&a=2&m=3&a=4");
        let payload = postback_payload(&msg);
        let names: Vec<_> = payload
            .split('&')
            .map(|s| s.split('=').next().unwrap())
            .collect();
        assert_eq!(names, vec!["cmd", "z", "a", "m", "a"]);
    }

    #[test]
    fn test_postback_payload_empty_message() {
        assert_eq!(postback_payload(&CallbackMessage::default()), VALIDATE_COMMAND);
    }

    #[test]
    fn test_classify_reply() {
        assert_eq!(classify_reply(200, "VERIFIED"), VerificationOutcome::Valid);
        assert_eq!(classify_reply(200, "INVALID"), VerificationOutcome::Invalid);
        assert_eq!(
            classify_reply(200, "VERIFIED\n"),
            VerificationOutcome::Error(VerifyError::UnexpectedBody("VERIFIED\n".to_string()))
        );
        assert_eq!(
            classify_reply(200, "verified"),
            VerificationOutcome::Error(VerifyError::UnexpectedBody("verified".to_string()))
        );
        assert_eq!(
            classify_reply(503, "VERIFIED"),
            VerificationOutcome::Error(VerifyError::UnexpectedStatus(503))
        );
    }

    #[test]
    fn test_outcome_trust() {
        assert!(VerificationOutcome::Valid.is_valid());
        assert!(!VerificationOutcome::Invalid.is_valid());
        assert!(!VerificationOutcome::Error(VerifyError::Network("x".into())).is_valid());
    }

    #[tokio::test]
    async fn test_verify_at_verified() {
        let (url, received) = spawn_gateway(StatusCode::OK, "VERIFIED", Duration::ZERO).await;
        let msg = CallbackMessage::decode(b"txn_id=1&payment_status=Completed");

        let outcome = client(Duration::from_secs(5)).verify_at(&msg, &url).await;

        assert_eq!(outcome, VerificationOutcome::Valid);
        let hits = received.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].method, Method::POST);
        assert_eq!(
            hits[0].body,
            "cmd=_notify-validate&txn_id=1&payment_status=Completed"
        );
    }

    #[tokio::test]
    async fn test_postback_headers() {
        let (url, received) = spawn_gateway(StatusCode::OK, "VERIFIED", Duration::ZERO).await;
        let msg = CallbackMessage::decode(b"txn_id=1");

        client(Duration::from_secs(5)).verify_at(&msg, &url).await;

        let hits = received.lock().unwrap();
        assert_eq!(hits[0].content_type, "application/x-www-form-urlencoded");
        assert_eq!(hits[0].user_agent, USER_AGENT);
        assert!(hits[0].user_agent.starts_with("ipn-listener/"));
    }

    #[tokio::test]
    async fn test_verify_at_redirect_is_not_followed() {
        let hits = Arc::new(Mutex::new(Vec::new()));
        let url = start_gateway(FakeGateway {
            hits: hits.clone(),
            status: StatusCode::FOUND,
            reply: "",
            delay: Duration::ZERO,
            location: Some("/other"),
        })
        .await;
        let msg = CallbackMessage::decode(b"txn_id=1&payment_status=Completed");

        let outcome = client(Duration::from_secs(5)).verify_at(&msg, &url).await;

        assert_eq!(outcome, VerificationOutcome::Error(VerifyError::UnexpectedStatus(302)));
        let hits = hits.lock().unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, WEBSCR_PATH);
    }

    #[tokio::test]
    async fn test_verify_at_invalid() {
        let (url, _) = spawn_gateway(StatusCode::OK, "INVALID", Duration::ZERO).await;
        let msg = CallbackMessage::decode(b"txn_id=1&payment_status=Completed");

        let outcome = client(Duration::from_secs(5)).verify_at(&msg, &url).await;

        assert_eq!(outcome, VerificationOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_verify_at_server_error() {
        let (url, _) =
            spawn_gateway(StatusCode::INTERNAL_SERVER_ERROR, "oops", Duration::ZERO).await;
        let msg = CallbackMessage::decode(b"txn_id=1");

        let outcome = client(Duration::from_secs(5)).verify_at(&msg, &url).await;

        assert_eq!(outcome, VerificationOutcome::Error(VerifyError::UnexpectedStatus(500)));
    }

    #[tokio::test]
    async fn test_verify_at_timeout() {
        let (url, received) =
            spawn_gateway(StatusCode::OK, "VERIFIED", Duration::from_secs(5)).await;
        let msg = CallbackMessage::decode(b"txn_id=1");
        let timeout = Duration::from_millis(200);

        let outcome = client(timeout).verify_at(&msg, &url).await;

        assert_eq!(outcome, VerificationOutcome::Error(VerifyError::Timeout(timeout)));
        // Exactly one attempt, no retry.
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_at_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let msg = CallbackMessage::decode(b"txn_id=1");
        let outcome = client(Duration::from_secs(2))
            .verify_at(&msg, &format!("http://{}/cgi-bin/webscr", addr))
            .await;

        assert!(matches!(outcome, VerificationOutcome::Error(VerifyError::Network(_))));
    }
}
