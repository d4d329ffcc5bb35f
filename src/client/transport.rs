use async_trait::async_trait;
use tokio::sync::mpsc;

/// Events emitted by the remote-automation transport, delivered to the
/// controller in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A credential-exchange QR payload was generated.
    Qr { encoded_image: String },
    /// The session authenticated. The id, when present, is redacted before
    /// it reaches any log or response.
    Authenticated { session_id: Option<String> },
    /// The transport finished its own periodic session sync.
    RemoteSessionSaved,
    /// The client is fully ready for message intake.
    Ready,
    /// The transport reported a disconnect.
    Disconnected { reason: String },
    /// Authentication failed for this attempt.
    AuthFailure { message: String },
}

/// Faults raised by transport operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("transport initialization failed: {0}")]
    InitFailed(String),
    #[error("transport destroy failed: {0}")]
    DestroyFailed(String),
    #[error("session persist failed: {0}")]
    PersistFailed(String),
}

/// The external remote-automation client driving the messaging-platform
/// session. Implementations push [`TransportEvent`]s into the sender handed
/// to their factory.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start (or resume) the underlying browser-driven session. Slow and
    /// failure-prone; the controller serializes calls to it.
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Tear the session down and release the browser resources.
    async fn destroy(&self) -> Result<(), TransportError>;

    /// Whether the transport considers the session authenticated.
    async fn is_authenticated(&self) -> bool;

    /// Whether the underlying connection (browser socket) is live. Can
    /// disagree with the recorded state; that disagreement is drift.
    async fn is_connected(&self) -> bool;

    /// Force the transport's credential-persist hook, outside its own
    /// periodic sync schedule.
    async fn persist_session(&self) -> Result<(), TransportError>;
}

/// Creates transport handles on demand. The controller invokes this on first
/// initialization and again after a destroy, so a fresh handle never coexists
/// with a live one.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError>;
}
