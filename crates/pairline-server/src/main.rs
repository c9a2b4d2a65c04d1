//! # pairline-server
//!
//! HTTP front end for the Pairline matchmaking service.
//!
//! This binary provides:
//! - **Waiting queue** that anonymous participants join and leave over REST
//! - **Pairing and liveness sweeps** running on fixed tokio intervals
//! - **Server-sent events** announcing matches and departed peers
//! - **Session mailboxes** for relaying text between the two peers
//! - **Admin API** (bearer token) for operator status views

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use pairline_core::MatchService;

use crate::api::AppState;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,pairline_server=debug,pairline_core=debug")
            }),
        )
        .init();

    info!("Starting Pairline server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        instance = %config.instance_name,
        admin_enabled = config.admin_token.is_some(),
        max_active_sessions = config.pairing.max_active_sessions,
        "Instance settings"
    );

    // -----------------------------------------------------------------------
    // 3. Build the service and start its sweeps
    // -----------------------------------------------------------------------
    let service = Arc::new(MatchService::new(config.pairing.clone()));
    let sweeps = service.start();

    let http_addr = config.http_addr;
    let app_state = AppState {
        service,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    let result = tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(ref e) = result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            result
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
            Ok(())
        }
    };

    sweeps.shutdown().await;

    result
}
