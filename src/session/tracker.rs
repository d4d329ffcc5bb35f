use crate::store::{SessionStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Maximum entries retained per event log. Oldest entries are evicted first.
pub const EVENT_LOG_CAP: usize = 100;

/// Number of entries returned by a summary with recent events included.
const RECENT_EVENT_COUNT: usize = 5;

/// Session ids are truncated to this many characters before they leave the
/// tracker, so no full id ever reaches logs or response bodies.
const SESSION_ID_PREFIX_LEN: usize = 8;

/// A single recorded session event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub attributes: serde_json::Value,
}

/// Which bounded log an event lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Auth,
    Connection,
}

/// Snapshot of the tracker's state, safe to serialize into HTTP responses.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub last_session_save: Option<DateTime<Utc>>,
    pub session_id: Option<String>,
    pub auth_event_count: usize,
    pub connection_event_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_auth_events: Option<Vec<SessionEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_connection_events: Option<Vec<SessionEvent>>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    last_session_save: Option<DateTime<Utc>>,
    session_id: Option<String>,
    auth_events: VecDeque<SessionEvent>,
    connection_events: VecDeque<SessionEvent>,
}

/// Observability ledger for the session lifecycle.
///
/// This is the single place other components read session truth from:
/// mutated by the controller and store decorator, read by the status
/// endpoint, health monitor, and shutdown coordinator. Reads are
/// snapshot-consistent; the logs are capped FIFO.
#[derive(Debug, Default)]
pub struct SessionTracker {
    inner: RwLock<TrackerInner>,
}

/// Classify an event name into its log bucket.
///
/// Substring matching is kept for compatibility with the historical log
/// shapes; `disconnect` is covered by the `connect` check.
pub fn classify_event(name: &str) -> EventKind {
    if name.contains("connect") {
        EventKind::Connection
    } else {
        EventKind::Auth
    }
}

fn truncate_session_id(id: &str) -> String {
    let prefix: String = id.chars().take(SESSION_ID_PREFIX_LEN).collect();
    format!("{}...", prefix)
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event in the session history, evicting the oldest entry
    /// once a log exceeds [`EVENT_LOG_CAP`].
    pub fn record_event(&self, name: &str, attributes: serde_json::Value) -> SessionEvent {
        let event = SessionEvent {
            event: name.to_string(),
            timestamp: Utc::now(),
            attributes,
        };

        let mut inner = self.inner.write().expect("tracker lock poisoned");
        let log = match classify_event(name) {
            EventKind::Connection => &mut inner.connection_events,
            EventKind::Auth => &mut inner.auth_events,
        };
        log.push_back(event.clone());
        if log.len() > EVENT_LOG_CAP {
            log.pop_front();
        }

        event
    }

    /// Remember the current session id. Stored whole, exposed truncated.
    pub fn set_session_id(&self, id: &str) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        inner.session_id = Some(id.to_string());
    }

    /// Stamp a successful session save. Callers must only invoke this after
    /// the persist actually succeeded.
    pub fn mark_saved(&self) {
        let mut inner = self.inner.write().expect("tracker lock poisoned");
        inner.last_session_save = Some(Utc::now());
    }

    pub fn last_session_save(&self) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .expect("tracker lock poisoned")
            .last_session_save
    }

    /// Build a snapshot of the tracker state, optionally including the last
    /// few entries of each log.
    pub fn summary(&self, include_recent: bool) -> SessionSummary {
        let inner = self.inner.read().expect("tracker lock poisoned");

        let recent = |log: &VecDeque<SessionEvent>| {
            log.iter()
                .rev()
                .take(RECENT_EVENT_COUNT)
                .rev()
                .cloned()
                .collect::<Vec<_>>()
        };

        SessionSummary {
            last_session_save: inner.last_session_save,
            session_id: inner.session_id.as_deref().map(truncate_session_id),
            auth_event_count: inner.auth_events.len(),
            connection_event_count: inner.connection_events.len(),
            recent_auth_events: include_recent.then(|| recent(&inner.auth_events)),
            recent_connection_events: include_recent.then(|| recent(&inner.connection_events)),
        }
    }

    /// Decorate a store so `save`/`extract` feed the tracker before
    /// propagating the underlying result.
    pub fn wrap(self: &Arc<Self>, store: Arc<dyn SessionStore>) -> TrackedStore {
        TrackedStore {
            inner: store,
            tracker: Arc::clone(self),
        }
    }
}

/// Store decorator that records save/extract outcomes in the tracker.
///
/// Explicit composition: the base adapter is wrapped and forwarded to, never
/// mutated.
pub struct TrackedStore {
    inner: Arc<dyn SessionStore>,
    tracker: Arc<SessionTracker>,
}

fn session_id_of(blob: &serde_json::Value) -> Option<&str> {
    blob.get("id").and_then(|v| v.as_str())
}

#[async_trait]
impl SessionStore for TrackedStore {
    async fn save(&self, session_name: &str, blob: serde_json::Value) -> StoreResult<()> {
        if let Some(id) = session_id_of(&blob) {
            debug!(session_id_prefix = %truncate_session_id(id), "saving session to store");
            self.tracker.set_session_id(id);
        }

        match self.inner.save(session_name, blob).await {
            Ok(()) => {
                info!("session saved to store");
                self.tracker.mark_saved();
                self.tracker.record_event("session_saved", json!({"success": true}));
                Ok(())
            }
            Err(e) => {
                warn!("failed to save session to store: {}", e);
                self.tracker
                    .record_event("session_save_failed", json!({"error": e.to_string()}));
                Err(e)
            }
        }
    }

    async fn extract(&self, session_name: &str) -> StoreResult<Option<serde_json::Value>> {
        match self.inner.extract(session_name).await {
            Ok(Some(blob)) => {
                if let Some(id) = session_id_of(&blob) {
                    info!(session_id_prefix = %truncate_session_id(id), "session extracted from store");
                    self.tracker.set_session_id(id);
                }
                self.tracker
                    .record_event("session_extracted", json!({"success": true}));
                Ok(Some(blob))
            }
            Ok(None) => {
                warn!("no session found in store");
                self.tracker.record_event("no_session_found", serde_json::Value::Null);
                Ok(None)
            }
            Err(e) => {
                warn!("error extracting session from store: {}", e);
                self.tracker
                    .record_event("session_extract_failed", json!({"error": e.to_string()}));
                Err(e)
            }
        }
    }

    async fn delete(&self, session_name: &str) -> StoreResult<bool> {
        self.inner.delete(session_name).await
    }

    async fn is_connected(&self) -> bool {
        self.inner.is_connected().await
    }

    async fn reconnect(&self) -> StoreResult<()> {
        self.inner.reconnect().await
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        self.inner.reset_collection().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }
}
