use crate::store::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of the automation client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Uninitialized,
    Initializing,
    AwaitingAuth,
    Authenticated,
    Ready,
    Degraded,
    Reinitializing,
    Destroyed,
    /// Terminal per attempt: the controller only leaves this state on an
    /// explicit restart call, never by auto-retry.
    AuthFailed,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClientState::Uninitialized => "uninitialized",
            ClientState::Initializing => "initializing",
            ClientState::AwaitingAuth => "awaiting_auth",
            ClientState::Authenticated => "authenticated",
            ClientState::Ready => "ready",
            ClientState::Degraded => "degraded",
            ClientState::Reinitializing => "reinitializing",
            ClientState::Destroyed => "destroyed",
            ClientState::AuthFailed => "auth_failed",
        };
        f.write_str(name)
    }
}

/// Typed faults surfaced by the controller's public operations, so each
/// caller (health monitor, shutdown coordinator, admin endpoints) can decide
/// to retry or log-only.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("client handle is not available")]
    HandleMissing,
    #[error("prerequisite not met: {0}")]
    PrereqNotMet(String),
    #[error("authentication failed: {0}")]
    AuthFailure(String),
    #[error("reinitialization failed: {0}")]
    ReinitFailed(String),
    #[error("session save failed: {0}")]
    SaveFailed(String),
    #[error("browser transport disconnected")]
    BrowserDisconnected,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Ephemeral credential-exchange payload produced by the transport.
///
/// Cleared on authentication and on disconnection; never persisted.
#[derive(Debug, Clone)]
pub struct QrArtifact {
    pub encoded_image: String,
    pub generated_at: DateTime<Utc>,
}

/// Read-only view of the QR artifact for the UI collaborator and the status
/// endpoint. The encoded image itself is only handed out by
/// [`crate::client::ClientController::qr_image`].
#[derive(Debug, Clone, Serialize)]
pub struct QrSnapshot {
    pub has_qr: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub age_minutes: i64,
    pub is_expired: bool,
}

impl QrSnapshot {
    pub(crate) fn from_artifact(artifact: Option<&QrArtifact>, expiry_minutes: i64) -> Self {
        let generated_at = artifact.map(|a| a.generated_at);
        let age_minutes = generated_at
            .map(|t| (Utc::now() - t).num_minutes())
            .unwrap_or(0);
        Self {
            has_qr: artifact.is_some(),
            generated_at,
            age_minutes,
            is_expired: age_minutes > expiry_minutes,
        }
    }
}
