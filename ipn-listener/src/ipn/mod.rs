//! IPN verification core.
//!
//! ## Processing Flow
//!
//! ```text
//! raw body → CallbackMessage → Verifier (postback) → IpnEvent → Dispatcher → subscribers
//! ```

pub mod dispatch;
pub mod event;
pub mod message;
pub mod subscribers;
pub mod verify;

pub use dispatch::{DispatchReport, Dispatcher, Subscriber, SubscriberError};
pub use event::{IpnEvent, IpnEventKind};
pub use message::{CallbackMessage, DecodeError, Field};
pub use subscribers::EventLogger;
pub use verify::{
    postback_payload, VerificationClient, VerificationOutcome, Verifier, VerifyError,
};
