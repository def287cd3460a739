//! IPN Listener - PayPal Instant Payment Notification receiver.
//!
//! Receives IPN callbacks, confirms each one with the gateway through the
//! `cmd=_notify-validate` postback, and hands the classified event to the
//! registered subscribers.
//!
//! ## Architecture
//!
//! ```text
//! Gateway → Listener → Decoder → Postback (VERIFIED / INVALID) → Dispatcher → Subscribers
//! ```

pub mod config;
pub mod gateway;
pub mod ipn;
pub mod web;

// Re-export commonly used types
pub use config::{Config, ConfigProvider, EnvConfigProvider, GatewayConfig, StaticConfigProvider};
pub use gateway::{resolve_listener_path, GatewayMode, DEFAULT_LISTENER_PATH};
pub use ipn::{
    CallbackMessage, Dispatcher, EventLogger, IpnEvent, IpnEventKind, Subscriber,
    SubscriberError, VerificationClient, VerificationOutcome, Verifier, VerifyError,
};
pub use web::{router, AppState};
