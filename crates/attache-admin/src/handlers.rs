// SPDX-FileCopyrightText: 2026 Attache Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin API request handlers.

use std::sync::atomic::Ordering;

use attache_core::AttacheError;
use attache_storage::models::{AiProfile, UserProfile};
use attache_storage::queries::{contacts, messages, profiles, queue, report_queue};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{info, warn};

use crate::AdminState;

/// Uniform error mapping: storage failures become a 500 with a terse body.
fn internal_error(e: AttacheError) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %e, "admin request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": e.to_string()})),
    )
}

type HandlerResult = Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)>;

/// `GET /api/status`
pub async fn get_status(State(state): State<AdminState>) -> Json<serde_json::Value> {
    let whatsapp = state.whatsapp_status.read().await.clone();
    let telegram_connected = state
        .telegram_connected
        .as_ref()
        .map(|flag| flag.load(Ordering::Relaxed))
        .unwrap_or(false);
    Json(serde_json::json!({
        "whatsapp": whatsapp,
        "telegram": { "connected": telegram_connected },
    }))
}

/// `POST /api/disconnect`
///
/// Signals the runtime and responds immediately; logout, credential wipe,
/// and lock release happen asynchronously before any reconnect attempt.
pub async fn post_disconnect(State(state): State<AdminState>) -> HandlerResult {
    info!("admin disconnect requested");
    state.disconnect_tx.send(()).await.map_err(|_| {
        internal_error(AttacheError::Internal(
            "runtime is not accepting disconnect commands".into(),
        ))
    })?;
    Ok(Json(serde_json::json!({"success": true})))
}

/// `GET /api/contacts`
pub async fn get_contacts(State(state): State<AdminState>) -> HandlerResult {
    let list = contacts::list(&state.db, 200).await.map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "contacts": list })))
}

/// `GET /api/contacts/:phone/messages`
pub async fn get_contact_messages(
    State(state): State<AdminState>,
    Path(phone): Path<String>,
) -> HandlerResult {
    let logs = messages::history(&state.db, &phone, 200)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({ "messages": logs })))
}

/// `GET /api/stats`
pub async fn get_stats(State(state): State<AdminState>) -> HandlerResult {
    let contact_count = contacts::count(&state.db).await.map_err(internal_error)?;
    let message_count = messages::count(&state.db).await.map_err(internal_error)?;
    let queue_depth = queue::depth(&state.db).await.map_err(internal_error)?;
    let pending_reports = report_queue::pending_count(&state.db)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({
        "contacts": contact_count,
        "messages": message_count,
        "queue_depth": queue_depth,
        "pending_reports": pending_reports,
        "workers": state.stats.workers(),
        "processed": state.stats.processed(),
        "failed": state.stats.failed(),
    })))
}

/// `PUT /api/profile/ai` — idempotent singleton upsert.
pub async fn put_ai_profile(
    State(state): State<AdminState>,
    Json(profile): Json<AiProfile>,
) -> HandlerResult {
    profiles::put_ai_profile(&state.db, &profile)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({"success": true})))
}

/// `PUT /api/profile/user` — idempotent singleton upsert.
pub async fn put_user_profile(
    State(state): State<AdminState>,
    Json(profile): Json<UserProfile>,
) -> HandlerResult {
    profiles::put_user_profile(&state.db, &profile)
        .await
        .map_err(internal_error)?;
    Ok(Json(serde_json::json!({"success": true})))
}
