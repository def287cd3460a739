//! Classified IPN events.

use std::fmt;
use std::sync::Arc;

use super::message::CallbackMessage;
use super::verify::VerificationOutcome;

/// Which way the trust decision went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpnEventKind {
    Valid,
    Invalid,
}

impl IpnEventKind {
    /// Event name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            IpnEventKind::Valid => "ipn.message.valid",
            IpnEventKind::Invalid => "ipn.message.invalid",
        }
    }
}

impl fmt::Display for IpnEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A callback paired with its verification outcome.
///
/// Built once per inbound callback and shared read-only with every
/// subscriber.
#[derive(Debug, Clone)]
pub struct IpnEvent {
    message: Arc<CallbackMessage>,
    outcome: VerificationOutcome,
    id: String,
}

impl IpnEvent {
    pub fn new(message: CallbackMessage, outcome: VerificationOutcome) -> Self {
        let id = message
            .txn_id()
            .map(str::to_string)
            .unwrap_or_else(|| message.fingerprint());

        Self {
            message: Arc::new(message),
            outcome,
            id,
        }
    }

    pub fn message(&self) -> &CallbackMessage {
        &self.message
    }

    pub fn outcome(&self) -> &VerificationOutcome {
        &self.outcome
    }

    /// Correlation id: the transaction id, or a body fingerprint without one.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Errors classify as invalid.
    pub fn kind(&self) -> IpnEventKind {
        if self.outcome.is_valid() {
            IpnEventKind::Valid
        } else {
            IpnEventKind::Invalid
        }
    }

    pub fn is_valid(&self) -> bool {
        self.kind() == IpnEventKind::Valid
    }
}
