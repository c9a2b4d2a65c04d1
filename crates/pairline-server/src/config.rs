//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::time::Duration;

use pairline_core::PairingConfig;
use pairline_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Human-readable name for this server instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Pairline"`
    pub instance_name: String,

    /// Admin API bearer token. Required to access /admin/* endpoints.
    /// Env: `ADMIN_TOKEN`
    /// Default: empty (admin API disabled).
    pub admin_token: Option<String>,

    /// Queue, sweep and liveness tunables.
    /// Env: `PAIRING_INTERVAL_MS`, `LIVENESS_SWEEP_INTERVAL_MS`,
    /// `LIVENESS_THRESHOLD_SECS`, `AWAY_AFTER_SECS`, `CLOSED_RETENTION_SECS`,
    /// `MAX_ACTIVE_SESSIONS`
    pub pairing: PairingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            instance_name: APP_NAME.to_string(),
            admin_token: None,
            pairing: PairingConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Some(token) = lookup("ADMIN_TOKEN") {
            if !token.is_empty() {
                config.admin_token = Some(token);
            }
        }

        // -- Pairing settings --

        let pairing = &mut config.pairing;
        if let Some(ms) = parse_u64(&lookup, "PAIRING_INTERVAL_MS") {
            pairing.pairing_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(ms) = parse_u64(&lookup, "LIVENESS_SWEEP_INTERVAL_MS") {
            pairing.liveness_sweep_interval = Duration::from_millis(ms.max(1));
        }
        if let Some(secs) = parse_u64(&lookup, "LIVENESS_THRESHOLD_SECS") {
            pairing.liveness_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "AWAY_AFTER_SECS") {
            pairing.away_after = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "CLOSED_RETENTION_SECS") {
            pairing.closed_retention = Duration::from_secs(secs);
        }
        if let Some(n) = parse_u64(&lookup, "MAX_ACTIVE_SESSIONS") {
            pairing.max_active_sessions = n as usize;
        }

        if pairing.away_after >= pairing.liveness_threshold {
            tracing::warn!(
                away_after = pairing.away_after.as_secs(),
                threshold = pairing.liveness_threshold.as_secs(),
                "AWAY_AFTER_SECS is not below LIVENESS_THRESHOLD_SECS; peers will never show as away"
            );
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid numeric setting, using default");
            None
        }
    }
}
