//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Hook registration is code, not
//! configuration; only the limits applied around hook invocations live
//! here.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Capacity of the broker's broadcast channel.
    pub broker_capacity: usize,

    /// Seconds between periodic presence updates of a session.
    pub presence_interval_secs: u64,

    /// Upper bound for one hook invocation in milliseconds (0 = no limit).
    pub hook_timeout_ms: u64,

    /// Milliseconds a cancelled hook may keep running before the gateway
    /// stops waiting for it.
    pub hook_cancel_grace_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            broker_capacity: 10_000,
            presence_interval_secs: 25,
            hook_timeout_ms: 0,
            hook_cancel_grace_ms: 5_000,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the [`Default`] values when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let listen_addr = match std::env::var("LISTEN_ADDR") {
            Ok(addr) => addr.parse()?,
            Err(_) => defaults.listen_addr,
        };

        Ok(Self {
            listen_addr,
            broker_capacity: parse_env("BROKER_CAPACITY", defaults.broker_capacity),
            presence_interval_secs: parse_env(
                "PRESENCE_INTERVAL_SECS",
                defaults.presence_interval_secs,
            ),
            hook_timeout_ms: parse_env("HOOK_TIMEOUT_MS", defaults.hook_timeout_ms),
            hook_cancel_grace_ms: parse_env("HOOK_CANCEL_GRACE_MS", defaults.hook_cancel_grace_ms),
        })
    }

    /// Interval between periodic presence updates, never shorter than one
    /// second.
    #[must_use]
    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.presence_interval_secs.max(1))
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
