//! Configuration module for environment variable parsing.
//!
//! Process-level settings (port, postback timeout) are read once at startup.
//! Gateway settings (mode, listener gate, path override, field logging) are
//! exposed through a [`ConfigProvider`] so the listener can take a fresh
//! snapshot on every request.

use std::env;
use std::time::Duration;

use tracing::warn;

use crate::gateway::GatewayMode;

/// Read-only gateway settings snapshot, taken once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Which gateway environment postbacks are sent to
    pub mode: GatewayMode,

    /// Hard gate for the listener; `false` answers every callback with 401
    pub listener_enabled: bool,

    /// Optional listener path override (e.g. "/hooks/paypal")
    pub listener_path: Option<String>,

    /// Log the full decoded field set of every callback
    pub logging_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Sandbox,
            listener_enabled: false,
            listener_path: None,
            logging_enabled: false,
        }
    }
}

impl GatewayConfig {
    /// Load gateway settings from `IPN_*` environment variables.
    pub fn from_env() -> Self {
        GatewayConfig {
            mode: GatewayMode::parse(&env::var("IPN_MODE").unwrap_or_default()),

            listener_enabled: parse_flag("IPN_ENABLED"),

            listener_path: env::var("IPN_PATH")
                .ok()
                .filter(|p| !p.trim().is_empty()),

            logging_enabled: parse_flag("IPN_LOGGING"),
        }
    }
}

/// Source of gateway configuration snapshots.
pub trait ConfigProvider: Send + Sync {
    /// Return the settings in effect for the current request.
    fn snapshot(&self) -> GatewayConfig;
}

/// Re-reads the environment on every snapshot.
#[derive(Debug, Default, Clone)]
pub struct EnvConfigProvider;

impl ConfigProvider for EnvConfigProvider {
    fn snapshot(&self) -> GatewayConfig {
        GatewayConfig::from_env()
    }
}

/// Serves one fixed snapshot.
#[derive(Debug, Clone)]
pub struct StaticConfigProvider(pub GatewayConfig);

impl ConfigProvider for StaticConfigProvider {
    fn snapshot(&self) -> GatewayConfig {
        self.0.clone()
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Timeout for the confirmation postback in milliseconds
    pub verify_timeout_ms: u64,

    /// Gateway settings as seen at startup; used to resolve the listener path
    pub gateway: GatewayConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),

            verify_timeout_ms: parse_or("IPN_VERIFY_TIMEOUT_MS", 10_000),

            gateway: GatewayConfig::from_env(),
        }
    }

    /// Postback timeout as a `Duration`.
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

/// Parse a numeric variable, warning and falling back on garbage.
fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(env_var = name, value = %raw, "Invalid numeric value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean flag. Anything not recognisably "on" is off.
fn parse_flag(name: &str) -> bool {
    env::var(name)
        .map(|raw| {
            matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(false)
}
