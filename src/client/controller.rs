use crate::client::transport::{Transport, TransportEvent, TransportFactory};
use crate::client::types::{ClientError, ClientState, QrArtifact, QrSnapshot};
use crate::session::SessionTracker;
use crate::store::SessionStore;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Bound on how long `destroy` waits for an in-flight operation holding the
/// handle lock before abandoning the handle.
const DESTROY_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Fixed name the session record is persisted under.
    pub session_name: String,
    /// Minutes after which a QR artifact is considered expired.
    pub qr_expiry_minutes: i64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            session_name: "support-bridge".to_string(),
            qr_expiry_minutes: 2,
        }
    }
}

/// Exclusive owner of the automation-client handle.
///
/// Drives the handle through an explicit state machine in response to
/// transport events and caller operations. The `handle` mutex is the single
/// mutual-exclusion point: `initialize`, `recover`, `destroy`, and `flush`
/// all serialize through it, so no two of them ever race the same transport
/// and no second transport instance can be created while one is live.
pub struct ClientController {
    config: ControllerConfig,
    store: Arc<dyn SessionStore>,
    tracker: Arc<SessionTracker>,
    factory: Arc<dyn TransportFactory>,
    handle: Mutex<Option<Box<dyn Transport>>>,
    handle_present: AtomicBool,
    state: RwLock<ClientState>,
    qr: RwLock<Option<QrArtifact>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: StdMutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl ClientController {
    pub fn new(
        store: Arc<dyn SessionStore>,
        tracker: Arc<SessionTracker>,
        factory: Arc<dyn TransportFactory>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            config,
            store,
            tracker,
            factory,
            handle: Mutex::new(None),
            handle_present: AtomicBool::new(false),
            state: RwLock::new(ClientState::Uninitialized),
            qr: RwLock::new(None),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
        })
    }

    /// Spawn the event pump that applies transport events in arrival order.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let mut rx = self
            .events_rx
            .lock()
            .expect("event receiver lock poisoned")
            .take()
            .unwrap_or_else(|| {
                // start() called twice; give the pump a dead channel.
                mpsc::unbounded_channel().1
            });

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                controller.apply_event(event);
            }
            debug!("transport event channel closed");
        })
    }

    pub fn state(&self) -> ClientState {
        *self.state.read().expect("state lock poisoned")
    }

    fn set_state(&self, next: ClientState) {
        let mut state = self.state.write().expect("state lock poisoned");
        if *state != next {
            debug!(from = %*state, to = %next, "client state transition");
            *state = next;
        }
    }

    /// Transition only if the state has not been advanced concurrently by a
    /// transport event.
    fn transition_if(&self, expected: ClientState, next: ClientState) {
        let mut state = self.state.write().expect("state lock poisoned");
        if *state == expected {
            debug!(from = %expected, to = %next, "client state transition");
            *state = next;
        }
    }

    fn clear_qr(&self) {
        let mut qr = self.qr.write().expect("qr lock poisoned");
        if qr.take().is_some() {
            debug!("QR artifact cleared");
        }
    }

    /// Apply a transport event to the state machine. Events are never
    /// dropped: the transition table is applied regardless of the current
    /// state so a replayed sequence always lands in the same state.
    pub fn apply_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Qr { encoded_image } => {
                info!("QR code received, awaiting authentication");
                *self.qr.write().expect("qr lock poisoned") = Some(QrArtifact {
                    encoded_image,
                    generated_at: Utc::now(),
                });
                self.set_state(ClientState::AwaitingAuth);
                self.tracker.record_event("qr_received", serde_json::Value::Null);
            }
            TransportEvent::Authenticated { session_id } => {
                info!("client authenticated");
                self.clear_qr();
                if let Some(id) = session_id.as_deref() {
                    self.tracker.set_session_id(id);
                }
                self.set_state(ClientState::Authenticated);
                self.tracker.record_event(
                    "authenticated",
                    json!({"has_session_data": session_id.is_some()}),
                );
            }
            TransportEvent::RemoteSessionSaved => {
                info!("session saved remotely");
                self.tracker
                    .record_event("remote_session_saved", serde_json::Value::Null);
            }
            TransportEvent::Ready => {
                info!("client ready, message intake is live");
                self.clear_qr();
                self.set_state(ClientState::Ready);
                self.tracker.record_event("client_ready", serde_json::Value::Null);
            }
            TransportEvent::Disconnected { reason } => {
                warn!(reason, "client disconnected");
                self.clear_qr();
                self.set_state(ClientState::Degraded);
                self.tracker.record_event("disconnected", json!({"reason": reason}));
            }
            TransportEvent::AuthFailure { message } => {
                error!(message, "authentication failed");
                self.set_state(ClientState::AuthFailed);
                self.tracker.record_event("auth_failure", json!({"error": message}));
            }
        }
    }

    /// Initialize the client, creating a transport handle if none is live.
    ///
    /// Requires the store to be reachable. A no-op while a session is
    /// already in flight (`Ready` and the intermediate states); after a
    /// destroy, the state is reset and a fresh handle is created. An
    /// `AuthFailed` client is only re-attempted through this explicit call.
    pub async fn initialize(&self) -> Result<(), ClientError> {
        if !self.store.is_connected().await {
            return Err(ClientError::PrereqNotMet(
                "session store is not reachable".to_string(),
            ));
        }

        let mut guard = self.handle.lock().await;

        match self.state() {
            ClientState::Ready => {
                debug!("client already ready, initialize is a no-op");
                return Ok(());
            }
            ClientState::Initializing
            | ClientState::AwaitingAuth
            | ClientState::Authenticated
            | ClientState::Reinitializing => {
                debug!(state = %self.state(), "initialization already in flight");
                return Ok(());
            }
            ClientState::Destroyed => self.set_state(ClientState::Uninitialized),
            ClientState::Uninitialized | ClientState::AuthFailed | ClientState::Degraded => {}
        }

        self.set_state(ClientState::Initializing);
        self.tracker
            .record_event("client_initializing", serde_json::Value::Null);

        if guard.is_none() {
            let transport = match self.factory.create(self.events_tx.clone()).await {
                Ok(transport) => transport,
                Err(e) => {
                    self.set_state(ClientState::AuthFailed);
                    self.tracker
                        .record_event("auth_failure", json!({"error": e.to_string()}));
                    return Err(ClientError::AuthFailure(e.to_string()));
                }
            };
            *guard = Some(transport);
            self.handle_present.store(true, Ordering::SeqCst);
        }

        match self.store.extract(&self.config.session_name).await {
            Ok(Some(_)) => info!("prior session found, transport will attempt to resume it"),
            Ok(None) => info!("no prior session, expecting QR authentication"),
            Err(e) => warn!("could not check for a prior session: {}", e),
        }

        let transport = guard.as_ref().ok_or(ClientError::HandleMissing)?;
        if let Err(e) = transport.initialize().await {
            error!("client initialization failed: {}", e);
            self.set_state(ClientState::AuthFailed);
            self.tracker
                .record_event("auth_failure", json!({"error": e.to_string()}));
            return Err(ClientError::AuthFailure(e.to_string()));
        }

        info!("client initialization completed");
        Ok(())
    }

    /// Recover a degraded session by re-initializing the same logical
    /// session; the stored blob is still present, so the transport can
    /// resume without a new QR scan when the prior session is valid.
    ///
    /// Invoked on a client whose transport silently dropped its connection
    /// (drift), this first degrades the recorded state. On failure the
    /// client stays `Degraded`; the health monitor owns the retry cadence.
    pub async fn recover(&self) -> Result<(), ClientError> {
        let guard = self.handle.lock().await;

        match self.state() {
            ClientState::Ready | ClientState::Authenticated => {
                warn!("transport connection lost without a disconnect event, degrading");
                self.clear_qr();
                self.set_state(ClientState::Degraded);
                self.tracker.record_event(
                    "browser_disconnected",
                    json!({"reason": "connectivity drift"}),
                );
            }
            ClientState::Degraded => {}
            other => {
                debug!(state = %other, "recover is a no-op in this state");
                return Ok(());
            }
        }

        let transport = guard.as_ref().ok_or(ClientError::HandleMissing)?;

        self.set_state(ClientState::Reinitializing);
        self.tracker
            .record_event("reinitializing", serde_json::Value::Null);

        match transport.initialize().await {
            Ok(()) => {
                info!("client re-initialization successful");
                self.transition_if(ClientState::Reinitializing, ClientState::Initializing);
                self.tracker
                    .record_event("reinitialized", serde_json::Value::Null);
                Ok(())
            }
            Err(e) => {
                error!("client re-initialization failed: {}", e);
                self.set_state(ClientState::Degraded);
                self.tracker
                    .record_event("reinit_failed", json!({"error": e.to_string()}));
                Err(ClientError::ReinitFailed(e.to_string()))
            }
        }
    }

    /// Destroy the client handle from any state.
    ///
    /// If the transport's own teardown fails the handle is abandoned anyway;
    /// a replacement handle must never coexist with a half-dead one.
    pub async fn destroy(&self) -> Result<(), ClientError> {
        // A flush backgrounded by shutdown may still hold the handle lock;
        // wait a bounded time, then abandon the handle rather than stall
        // the teardown sequence.
        let mut guard = match tokio::time::timeout(DESTROY_LOCK_WAIT, self.handle.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    "handle lock still held after {:?}, abandoning handle",
                    DESTROY_LOCK_WAIT
                );
                self.handle_present.store(false, Ordering::SeqCst);
                self.clear_qr();
                self.set_state(ClientState::Destroyed);
                self.tracker
                    .record_event("client_destroyed", serde_json::Value::Null);
                return Ok(());
            }
        };

        if let Some(transport) = guard.take() {
            info!("destroying client handle");
            self.handle_present.store(false, Ordering::SeqCst);
            if let Err(e) = transport.destroy().await {
                warn!("transport destroy failed, abandoning handle: {}", e);
                self.tracker
                    .record_event("destroy_failed", json!({"error": e.to_string()}));
            }
        }

        self.clear_qr();
        self.set_state(ClientState::Destroyed);
        self.tracker
            .record_event("client_destroyed", serde_json::Value::Null);
        Ok(())
    }

    /// Force an immediate session persist through the transport's
    /// credential-persist hook.
    pub async fn flush(&self) -> Result<(), ClientError> {
        let guard = self.handle.lock().await;
        let transport = guard.as_ref().ok_or(ClientError::HandleMissing)?;

        if !transport.is_authenticated().await {
            return Err(ClientError::SaveFailed(
                "client is not authenticated".to_string(),
            ));
        }
        if !transport.is_connected().await {
            return Err(ClientError::BrowserDisconnected);
        }

        info!("forcing session save");
        if let Err(e) = transport.persist_session().await {
            error!("forced session save failed: {}", e);
            self.tracker
                .record_event("session_save_failed", json!({"error": e.to_string()}));
            return Err(ClientError::SaveFailed(e.to_string()));
        }

        self.tracker.mark_saved();
        self.tracker
            .record_event("session_flushed", json!({"success": true}));
        info!("session save completed");
        Ok(())
    }

    /// Whether a transport handle currently exists.
    pub fn has_handle(&self) -> bool {
        self.handle_present.load(Ordering::SeqCst)
    }

    /// Authentication status as the transport reports it. Falls back to the
    /// recorded state while a lifecycle operation holds the handle.
    pub async fn is_authenticated(&self) -> bool {
        match self.handle.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(transport) => transport.is_authenticated().await,
                None => false,
            },
            Err(_) => matches!(
                self.state(),
                ClientState::Authenticated | ClientState::Ready
            ),
        }
    }

    /// Transport connectivity. While a lifecycle operation holds the handle
    /// this reports `true` so the health monitor does not pile a second
    /// recovery on top of one already in flight.
    pub async fn is_transport_connected(&self) -> bool {
        match self.handle.try_lock() {
            Ok(guard) => match guard.as_ref() {
                Some(transport) => transport.is_connected().await,
                None => false,
            },
            Err(_) => true,
        }
    }

    /// Whether the client has finished initialization.
    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state(),
            ClientState::Authenticated | ClientState::Ready
        )
    }

    pub fn qr_snapshot(&self) -> QrSnapshot {
        let qr = self.qr.read().expect("qr lock poisoned");
        QrSnapshot::from_artifact(qr.as_ref(), self.config.qr_expiry_minutes)
    }

    /// The encoded QR image for the UI collaborator, if one is pending.
    pub fn qr_image(&self) -> Option<String> {
        self.qr
            .read()
            .expect("qr lock poisoned")
            .as_ref()
            .map(|a| a.encoded_image.clone())
    }

    pub fn session_name(&self) -> &str {
        &self.config.session_name
    }
}
