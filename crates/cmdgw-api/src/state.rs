//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor. The gateway itself is cheap to clone (an
//! `Arc` handle), so `AppState` is `Clone` and every handler sees the
//! same store.

use cmdgw_engine::CommandGateway;

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token` to prevent credential leakage
/// in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Shared auth secret. `None` disables authentication (development
    /// mode).
    pub auth_token: Option<String>,
    /// Seconds between escalation sweeps.
    pub sweep_interval_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            sweep_interval_secs: 60,
        }
    }
}

impl AppConfig {
    /// Build configuration from `CMDGW_PORT`, `CMDGW_AUTH_TOKEN`, and
    /// `CMDGW_SWEEP_SECS`. Unset or unparseable values fall back to the
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: std::env::var("CMDGW_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            auth_token: std::env::var("CMDGW_AUTH_TOKEN").ok(),
            sweep_interval_secs: std::env::var("CMDGW_SWEEP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }
}

/// Shared state for all route handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The command gateway store.
    pub gateway: CommandGateway,
    /// Application configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Build state with the given configuration and an empty gateway.
    pub fn new(config: AppConfig) -> Self {
        Self {
            gateway: CommandGateway::new(),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
