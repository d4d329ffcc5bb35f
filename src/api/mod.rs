//! Administrative HTTP surface.
//!
//! Read endpoints report health and status; mutating endpoints are gated by
//! a bearer token equal to the configured admin key. No connection strings,
//! raw session blobs, or full session ids appear in any response.

mod admin;
mod status;

#[cfg(test)]
mod tests;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};

use crate::client::ClientController;
use crate::intake::IntakeRegistry;
use crate::session::SessionTracker;
use crate::store::SessionStore;
use crate::ticketing::TicketingProbe;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ClientController>,
    pub tracker: Arc<SessionTracker>,
    pub store: Arc<dyn SessionStore>,
    pub intake: Arc<IntakeRegistry>,
    pub ticketing: Arc<TicketingProbe>,
    pub admin_api_key: Option<String>,
    /// Local directory the transport unpacks session archives into; removed
    /// during administrative cleanup.
    pub scratch_dir: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/force-save", post(admin::force_save))
        .route("/api/cleanup-sessions", post(admin::cleanup_sessions))
        .with_state(state)
}
