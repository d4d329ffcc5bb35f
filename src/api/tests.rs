use super::{AppState, admin, status};
use crate::client::{
    ClientController, ClientState, ControllerConfig, Transport, TransportError, TransportEvent,
    TransportFactory,
};
use crate::intake::IntakeRegistry;
use crate::session::SessionTracker;
use crate::store::{MemoryStore, SessionStore};
use crate::ticketing::TicketingProbe;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Json;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::mpsc;

#[derive(Default)]
struct StubTransport {
    authenticated: AtomicBool,
    persist_calls: AtomicUsize,
}

#[async_trait]
impl Transport for Arc<StubTransport> {
    async fn initialize(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> bool {
        true
    }

    async fn persist_session(&self) -> Result<(), TransportError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StubFactory {
    transport: Arc<StubTransport>,
}

#[async_trait]
impl TransportFactory for StubFactory {
    async fn create(
        &self,
        _events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(Arc::clone(&self.transport)))
    }
}

struct Fixture {
    state: AppState,
    store: Arc<MemoryStore>,
    transport: Arc<StubTransport>,
}

fn fixture(admin_api_key: Option<&str>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(SessionTracker::new());
    let transport = Arc::new(StubTransport::default());
    let factory = Arc::new(StubFactory {
        transport: Arc::clone(&transport),
    });
    let controller = ClientController::new(
        store.clone(),
        tracker.clone(),
        factory,
        ControllerConfig::default(),
    );

    let state = AppState {
        controller,
        tracker,
        store: store.clone(),
        intake: Arc::new(IntakeRegistry::new()),
        ticketing: Arc::new(TicketingProbe::new(None)),
        admin_api_key: admin_api_key.map(str::to_string),
        scratch_dir: None,
        started_at: Utc::now(),
    };
    Fixture {
        state,
        store,
        transport,
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::AUTHORIZATION,
        format!("Bearer {}", token).parse().unwrap(),
    );
    headers
}

#[tokio::test]
async fn health_is_degraded_until_a_handle_exists() {
    let f = fixture(None);

    let (code, Json(body)) = status::health(State(f.state.clone())).await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["store"], json!(true));
    assert_eq!(body["client"], json!(false));

    f.state.controller.initialize().await.unwrap();
    let (code, Json(body)) = status::health(State(f.state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn health_is_degraded_when_the_store_drops() {
    let f = fixture(None);
    f.state.controller.initialize().await.unwrap();
    f.store.set_connected(false);

    let (code, Json(body)) = status::health(State(f.state)).await;
    assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["store"], json!(false));
    assert_eq!(body["client"], json!(true));
}

#[tokio::test]
async fn status_reports_the_session_summary_without_secrets() {
    let f = fixture(Some("secret"));
    f.state.controller.initialize().await.unwrap();
    f.state
        .controller
        .apply_event(TransportEvent::Authenticated {
            session_id: Some("very-long-session-identifier".to_string()),
        });
    f.state.intake.begin("user-1", "awaiting_description");

    let Json(body) = status::status(State(f.state)).await;
    assert_eq!(body["client"]["state"], json!("authenticated"));
    assert_eq!(body["intake"]["active_count"], json!(1));
    assert!(body["uptime_secs"].as_i64().unwrap() >= 0);
    assert_eq!(body["ticketing"]["configured"], json!(false));

    // Only the truncated prefix of the session id is exposed.
    assert_eq!(body["session"]["session_id"], json!("very-lon..."));
    let rendered = body.to_string();
    assert!(!rendered.contains("very-long-session-identifier"));
    assert!(!rendered.contains("secret"));
}

#[tokio::test]
async fn force_save_rejects_bad_tokens() {
    let f = fixture(Some("secret"));

    let (code, _) = admin::force_save(State(f.state.clone()), HeaderMap::new()).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);

    let (code, _) = admin::force_save(State(f.state.clone()), bearer("wrong")).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert_eq!(f.transport.persist_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn force_save_is_disabled_without_a_configured_key() {
    let f = fixture(None);
    let (code, _) = admin::force_save(State(f.state), bearer("anything")).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn force_save_flushes_with_a_valid_token() {
    let f = fixture(Some("secret"));
    f.state.controller.initialize().await.unwrap();
    f.transport.authenticated.store(true, Ordering::SeqCst);

    let (code, Json(body)) = admin::force_save(State(f.state), bearer("secret")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));
    assert_eq!(f.transport.persist_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn force_save_reports_flush_failures_in_the_body() {
    let f = fixture(Some("secret"));
    // No handle yet, so the flush itself fails.
    let (code, Json(body)) = admin::force_save(State(f.state), bearer("secret")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], json!("error"));
}

#[tokio::test]
async fn cleanup_deletes_the_record_and_destroys_the_handle() {
    let f = fixture(Some("secret"));
    f.state.controller.initialize().await.unwrap();
    f.state
        .store
        .save("support-bridge", json!({"id": "session-to-clear"}))
        .await
        .unwrap();

    let (code, Json(body)) =
        admin::cleanup_sessions(State(f.state.clone()), bearer("secret")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["deleted"], json!(true));
    assert_eq!(f.state.controller.state(), ClientState::Destroyed);
    assert!(f.store.extract("support-bridge").await.unwrap().is_none());

    // A fresh initialize starts over at the QR scan.
    f.state.controller.initialize().await.unwrap();
    f.state.controller.apply_event(TransportEvent::Qr {
        encoded_image: "fresh".to_string(),
    });
    assert_eq!(f.state.controller.state(), ClientState::AwaitingAuth);
}

#[tokio::test]
async fn cleanup_removes_the_scratch_directory() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = dir.path().join("scratch");
    tokio::fs::create_dir_all(&scratch).await.unwrap();
    tokio::fs::write(scratch.join("session.zip"), b"archive")
        .await
        .unwrap();

    let mut f = fixture(Some("secret"));
    f.state.scratch_dir = Some(scratch.clone());

    let (code, _) = admin::cleanup_sessions(State(f.state), bearer("secret")).await;
    assert_eq!(code, StatusCode::OK);
    assert!(!scratch.exists());
}

#[tokio::test]
async fn unauthorized_cleanup_has_no_side_effects() {
    let f = fixture(Some("secret"));
    f.state.controller.initialize().await.unwrap();
    f.state
        .store
        .save("support-bridge", json!({"id": "survives"}))
        .await
        .unwrap();

    let (code, _) = admin::cleanup_sessions(State(f.state.clone()), bearer("wrong")).await;
    assert_eq!(code, StatusCode::UNAUTHORIZED);
    assert!(f.state.controller.has_handle());
    assert!(f.store.extract("support-bridge").await.unwrap().is_some());
}
