//! # parley-server
//!
//! Backend chat service: one-to-one conversations and multi-participant
//! chatrooms, incremental message sync, and best-effort user presence.
//!
//! This binary provides:
//! - **SQLite-backed message store** (conversations, chatrooms, users)
//! - **Range-query retrieval** with time windows and per-user sync cursors
//! - **Presence tracking** from lightweight confirmation signals
//! - **REST API** (axum) exposing every service operation

mod api;
mod config;
mod service;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::service::ChatService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Store (runs migrations; creates the file if missing)
    let db = Database::open_at(&config.db_path)?;

    // Service: owns the store plus the volatile presence tracker
    let service = Arc::new(ChatService::new(db));

    let app_state = AppState { service };

    info!(instance = %config.instance_name, "Service initialized");

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
