//! Periodic health monitor.
//!
//! Every cycle checks the store connection, forces a session save while the
//! client is authenticated, and repairs connectivity drift (an authenticated
//! client whose transport socket died without a disconnect event). Cycles
//! never overlap: if a slow recovery is still running when the next tick
//! fires, that tick is skipped.

use crate::client::ClientController;
use crate::session::SessionTracker;
use crate::store::SessionStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Health monitor configuration.
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// Minutes between health check cycles.
    pub interval_minutes: u64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 10,
        }
    }
}

/// Background task watching the store and client for faults the event stream
/// alone does not surface.
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    store: Arc<dyn SessionStore>,
    controller: Arc<ClientController>,
    tracker: Arc<SessionTracker>,
    cycle_lock: Mutex<()>,
}

/// Handle to a running monitor loop.
pub struct MonitorHandle {
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stop the monitor loop. A cycle already in flight is cancelled at its
    /// next await point.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl HealthMonitor {
    pub fn new(
        store: Arc<dyn SessionStore>,
        controller: Arc<ClientController>,
        tracker: Arc<SessionTracker>,
        config: HealthMonitorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            controller,
            tracker,
            cycle_lock: Mutex::new(()),
        })
    }

    /// Spawn the periodic loop. The first cycle runs immediately so a broken
    /// store or drifted client is caught at startup, not ten minutes in.
    pub fn start(self: &Arc<Self>) -> MonitorHandle {
        let monitor = Arc::clone(self);
        let period = Duration::from_secs(self.config.interval_minutes * 60);
        info!(
            interval_minutes = self.config.interval_minutes,
            "health monitor started"
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                monitor.run_cycle().await;
            }
        });

        MonitorHandle { task }
    }

    /// Run one health check cycle. Public so an administrative endpoint or a
    /// test can force a cycle outside the timer cadence.
    pub async fn run_cycle(&self) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("previous health check still running, skipping this cycle");
            return;
        };

        let cycle_id = Uuid::new_v4();
        debug!(%cycle_id, "health check cycle started");

        self.check_store().await;
        self.check_client().await;
        self.log_memory();

        debug!(%cycle_id, "health check cycle finished");
    }

    async fn check_store(&self) {
        if self.store.is_connected().await {
            debug!("session store connection healthy");
            return;
        }

        warn!("session store is not connected, attempting reconnect");
        match self.store.reconnect().await {
            Ok(()) => {
                info!("session store reconnected");
                self.tracker
                    .record_event("store_reconnected", serde_json::Value::Null);
            }
            Err(e) => {
                error!("session store reconnect failed: {}", e);
                self.tracker
                    .record_event("store_reconnect_failed", json!({"error": e.to_string()}));
            }
        }
    }

    async fn check_client(&self) {
        if !self.controller.has_handle() {
            debug!("no client handle, nothing to check");
            return;
        }

        if self.controller.is_authenticated().await {
            // Periodic forced save keeps the stored blob from going stale
            // between the transport's own sync points.
            if let Err(e) = self.controller.flush().await {
                warn!("periodic session save failed: {}", e);
            }
        }

        // Drift: the recorded state says the session is live but the
        // transport socket is gone.
        if self.controller.is_initialized() && !self.controller.is_transport_connected().await {
            warn!("transport connectivity drift detected, recovering");
            if let Err(e) = self.controller.recover().await {
                error!("drift recovery failed, will retry next cycle: {}", e);
            }
        }
    }

    /// Log resident memory so slow leaks show up in the logs long before
    /// the process is killed for it.
    fn log_memory(&self) {
        if let Some(rss_kb) = resident_memory_kb() {
            info!(rss_mb = rss_kb / 1024, "process memory usage");
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_kb() -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        ClientController, ControllerConfig, Transport, TransportError, TransportEvent,
        TransportFactory,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct FlagTransport {
        authenticated: AtomicBool,
        connected: AtomicBool,
        initialize_calls: AtomicUsize,
        persist_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for Arc<FlagTransport> {
        async fn initialize(&self) -> Result<(), TransportError> {
            self.initialize_calls.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn destroy(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn is_authenticated(&self) -> bool {
            self.authenticated.load(Ordering::SeqCst)
        }

        async fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn persist_session(&self) -> Result<(), TransportError> {
            self.persist_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlagFactory {
        transport: Arc<FlagTransport>,
    }

    #[async_trait]
    impl TransportFactory for FlagFactory {
        async fn create(
            &self,
            _events: mpsc::UnboundedSender<TransportEvent>,
        ) -> Result<Box<dyn Transport>, TransportError> {
            Ok(Box::new(Arc::clone(&self.transport)))
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        controller: Arc<ClientController>,
        transport: Arc<FlagTransport>,
        monitor: Arc<HealthMonitor>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tracker = Arc::new(SessionTracker::new());
        let transport = Arc::new(FlagTransport::default());
        let factory = Arc::new(FlagFactory {
            transport: Arc::clone(&transport),
        });
        let controller = ClientController::new(
            store.clone(),
            tracker.clone(),
            factory,
            ControllerConfig::default(),
        );
        let monitor = HealthMonitor::new(
            store.clone(),
            controller.clone(),
            tracker,
            HealthMonitorConfig::default(),
        );
        Fixture {
            store,
            controller,
            transport,
            monitor,
        }
    }

    #[tokio::test]
    async fn cycle_forces_save_while_authenticated() {
        let f = fixture().await;
        f.controller.initialize().await.unwrap();
        f.transport.authenticated.store(true, Ordering::SeqCst);

        f.monitor.run_cycle().await;
        assert_eq!(f.transport.persist_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cycle_skips_save_without_authentication() {
        let f = fixture().await;
        f.controller.initialize().await.unwrap();

        f.monitor.run_cycle().await;
        assert_eq!(f.transport.persist_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cycle_recovers_drifted_transport() {
        let f = fixture().await;
        f.controller.initialize().await.unwrap();
        f.controller
            .apply_event(TransportEvent::Authenticated { session_id: None });
        f.controller.apply_event(TransportEvent::Ready);
        f.transport.authenticated.store(true, Ordering::SeqCst);

        // Socket died without a disconnected event.
        f.transport.connected.store(false, Ordering::SeqCst);
        f.monitor.run_cycle().await;

        // One call from initialize, one from the drift recovery.
        assert_eq!(f.transport.initialize_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cycle_reconnects_dropped_store() {
        let f = fixture().await;
        f.store.set_connected(false);

        f.monitor.run_cycle().await;
        assert!(f.store.is_connected().await);
    }

    #[tokio::test]
    async fn overlapping_cycle_is_skipped() {
        let f = fixture().await;
        f.transport.persist_calls.store(0, Ordering::SeqCst);

        let _guard = f.monitor.cycle_lock.lock().await;
        f.controller.initialize().await.unwrap();
        f.transport.authenticated.store(true, Ordering::SeqCst);

        // The lock is held, so this cycle must do nothing.
        f.monitor.run_cycle().await;
        assert_eq!(f.transport.persist_calls.load(Ordering::SeqCst), 0);
    }
}
