//! # rentease-server
//!
//! Messaging backend for the RentEase rental marketplace.
//!
//! This binary provides:
//! - **Realtime gateway** over WebSocket (`/socket`): presence, message relay
//!   with delivery and read receipts, typing indicators
//! - **REST API** (axum) for chat history, conversation lists, bulk read
//!   marking, deletion and profile updates
//! - **SQLite message store** shared by both surfaces
//! - **Per-IP rate limiting** on the REST API

mod api;
mod config;
mod error;
mod gateway;
mod presence;
mod rate_limit;
mod rooms;
mod store;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::gateway::{Gateway, GatewayConfig};
use crate::presence::PresenceRegistry;
use crate::rate_limit::RateLimiter;
use crate::rooms::RoomHub;
use crate::store::MessageStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rentease_server=debug")),
        )
        .init();

    info!("Starting RentEase messaging server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let store = MessageStore::open(config.database_path.as_deref())?;
    let presence = PresenceRegistry::new();
    let gateway = Gateway::new(
        store.clone(),
        presence.clone(),
        RoomHub::new(),
        GatewayConfig::from(&config),
    );
    let rate_limiter = RateLimiter::from_config(&config);

    let http_addr = config.http_addr;
    let app_state = AppState {
        gateway,
        store,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Evict rate-limit buckets idle for more than 10 minutes, every 5 minutes.
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let purged = rl.purge_stale(Duration::from_secs(600)).await;
            if purged > 0 {
                tracing::debug!(purged, "Purged idle rate-limit buckets");
            }
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP + WebSocket server until a shutdown signal
    // -----------------------------------------------------------------------
    let result = api::serve(app_state, http_addr, shutdown_signal()).await;

    let dropped = presence.shutdown().await;
    info!(dropped, "Presence cleared, server stopped");

    if let Err(e) = &result {
        tracing::error!(error = %e, "HTTP server failed");
    }
    result
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
