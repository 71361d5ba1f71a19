// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin HTTP server built on axum.
//!
//! Exposes transport status, the disconnect action, read-only views over the
//! stores, and the idempotent profile PUTs. The server binds to the loopback
//! interface by default; it carries no auth of its own and is meant to sit
//! behind the operator's reverse proxy.

pub mod handlers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use attache_core::{types::RuntimeStats, AttacheError, TransportStatus};
use attache_storage::Database;
use axum::routing::{get, post, put};
use axum::Router;
use tokio::sync::{mpsc, RwLock};
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state for admin request handlers.
#[derive(Clone)]
pub struct AdminState {
    pub db: Arc<Database>,
    pub stats: Arc<RuntimeStats>,
    /// Live status of the primary transport.
    pub whatsapp_status: Arc<RwLock<TransportStatus>>,
    /// Whether the Telegram dispatcher is polling (absent when disabled).
    pub telegram_connected: Option<Arc<AtomicBool>>,
    /// Signals the runtime to log out, wipe credentials, and release the
    /// session lock. The handler responds before any of that happens.
    pub disconnect_tx: mpsc::Sender<()>,
}

/// Builds the admin router.
pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/disconnect", post(handlers::post_disconnect))
        .route("/api/contacts", get(handlers::get_contacts))
        .route(
            "/api/contacts/:phone/messages",
            get(handlers::get_contact_messages),
        )
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/profile/ai", put(handlers::put_ai_profile))
        .route("/api/profile/user", put(handlers::put_user_profile))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves the admin API until the process exits.
pub async fn serve(host: &str, port: u16, state: AdminState) -> Result<(), AttacheError> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AttacheError::Config(format!("failed to bind admin API to {addr}: {e}")))?;

    info!(%addr, "admin API listening");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| AttacheError::Internal(format!("admin server error: {e}")))?;
    Ok(())
}
