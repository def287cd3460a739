//! Gateway mode and listener path resolution.
//!
//! Mode selection fails safe: only the exact string `live` reaches the
//! production gateway, everything else goes to the sandbox.

use std::fmt;

use tracing::warn;

use crate::config::GatewayConfig;

/// Postback endpoint for the production gateway.
pub const LIVE_ENDPOINT: &str = "https://www.paypal.com/cgi-bin/webscr";

/// Postback endpoint for the sandbox gateway.
pub const SANDBOX_ENDPOINT: &str = "https://www.sandbox.paypal.com/cgi-bin/webscr";

/// Listener path used when no override is configured.
pub const DEFAULT_LISTENER_PATH: &str = "/paypal/payment/ipn";

/// Gateway environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Sandbox,
    Live,
}

impl GatewayMode {
    /// Parse a configured mode string. Case-sensitive; unknown values are sandbox.
    pub fn parse(raw: &str) -> Self {
        if raw == "live" {
            GatewayMode::Live
        } else {
            GatewayMode::Sandbox
        }
    }

    /// Postback URL for this mode.
    pub fn endpoint(self) -> &'static str {
        match self {
            GatewayMode::Live => LIVE_ENDPOINT,
            GatewayMode::Sandbox => SANDBOX_ENDPOINT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GatewayMode::Live => "live",
            GatewayMode::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the path the listener route is mounted on.
///
/// The override is only honoured while the listener is enabled. It must
/// start with a slash and be a literal path (no `:param` or `*wildcard`
/// segments); otherwise [`DEFAULT_LISTENER_PATH`] is used.
pub fn resolve_listener_path(config: &GatewayConfig) -> String {
    if !config.listener_enabled {
        return DEFAULT_LISTENER_PATH.to_string();
    }

    let path = match config.listener_path.as_deref().map(str::trim) {
        Some("") | None => return DEFAULT_LISTENER_PATH.to_string(),
        Some(path) => path,
    };

    let reason = if !path.starts_with('/') {
        "missing_leading_slash"
    } else if path.contains(['*', ':']) {
        "route_pattern_characters"
    } else {
        return path.to_string();
    };

    warn!(
        listener_path = %path,
        reason = reason,
        default_path = DEFAULT_LISTENER_PATH,
        "listener_path_rejected"
    );
    DEFAULT_LISTENER_PATH.to_string()
}
