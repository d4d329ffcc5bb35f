use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use chrono::Utc;
use serde_json::{Value, json};

use super::AppState;

/// Liveness probe: healthy only when the store is connected and a client
/// handle exists.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store = state.store.is_connected().await;
    let client = state.controller.has_handle();

    let (code, status) = if store && client {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(json!({
            "status": status,
            "store": store,
            "client": client,
            "time": Utc::now(),
        })),
    )
}

/// Full status report for operators: uptime, store and client state, session
/// summary with recent events, intake queue, ticketing reachability.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    let now = Utc::now();
    let summary = state.tracker.summary(true);
    let ticketing = state.ticketing.check().await;

    Json(json!({
        "status": "ok",
        "time": now,
        "started_at": state.started_at,
        "uptime_secs": (now - state.started_at).num_seconds(),
        "store": {
            "connected": state.store.is_connected().await,
        },
        "client": {
            "state": state.controller.state(),
            "has_handle": state.controller.has_handle(),
            "authenticated": state.controller.is_authenticated().await,
            "initialized": state.controller.is_initialized(),
        },
        "qr": state.controller.qr_snapshot(),
        "session": summary,
        "intake": {
            "active_count": state.intake.active_count(),
            "users": state.intake.snapshot(),
        },
        "ticketing": ticketing,
    }))
}
