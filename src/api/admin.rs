use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Json;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::AppState;

type ApiResponse = (StatusCode, Json<Value>);

/// Check the bearer token against the configured admin key. With no key
/// configured the mutating endpoints are disabled outright.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiResponse> {
    let Some(key) = state.admin_api_key.as_deref() else {
        warn!("admin endpoint called but no admin API key is configured");
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "unauthorized",
                "message": "admin API key is not configured",
            })),
        ));
    };

    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == key);

    if authorized {
        Ok(())
    } else {
        warn!("admin endpoint called with an invalid or missing bearer token");
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "unauthorized",
                "message": "invalid or missing bearer token",
            })),
        ))
    }
}

/// Force an immediate session flush through the controller.
pub async fn force_save(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }

    info!("administrative force-save requested");
    let (status, message) = match state.controller.flush().await {
        Ok(()) => ("ok".to_string(), "session saved".to_string()),
        Err(e) => ("error".to_string(), e.to_string()),
    };

    (
        StatusCode::OK,
        Json(json!({
            "status": status,
            "message": message,
            "time": Utc::now(),
        })),
    )
}

/// Destroy the live client handle, delete the session record, and recreate
/// an empty collection, so the next initialize starts from a QR scan.
pub async fn cleanup_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(response) = require_admin(&state, &headers) {
        return response;
    }

    info!("administrative session cleanup requested");

    // Handle first: a live transport must not write a fresh blob back into
    // the store after the record is deleted.
    if let Err(e) = state.controller.destroy().await {
        warn!("client destroy failed during cleanup: {}", e);
    }

    let session_name = state.controller.session_name().to_string();
    let deleted = match state.store.delete(&session_name).await {
        Ok(deleted) => deleted,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "error",
                    "message": format!("failed to delete session record: {}", e),
                })),
            );
        }
    };

    if let Err(e) = state.store.reset_collection().await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": format!("failed to reset collection: {}", e),
            })),
        );
    }

    if let Some(scratch) = state.scratch_dir.as_deref() {
        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => info!(path = %scratch.display(), "session scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove session scratch directory: {}", e),
        }
    }

    info!(deleted, "session cleanup completed");
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "deleted": deleted,
            "message": "session cleaned up, next initialize will request a QR scan",
            "time": Utc::now(),
        })),
    )
}
