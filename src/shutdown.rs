//! Coordinated process teardown.
//!
//! The teardown order is fixed: stop the health monitor, force a final
//! session flush with a bounded wait, destroy the client handle, close the
//! store. Every step is best-effort; a fault in one never skips the rest.

use crate::client::ClientController;
use crate::health::MonitorHandle;
use crate::store::SessionStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Shutdown coordinator configuration.
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Seconds to wait for the final session flush to settle before moving
    /// on to the destroy step.
    pub flush_wait_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { flush_wait_secs: 2 }
    }
}

/// Classification of an uncaught fault: whether the process must tear down
/// or can log and continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// The transport's remote-auth setup referenced a session archive that
    /// does not exist yet. Expected on a first-time deployment before any
    /// session has been persisted; execution continues.
    ArchiveMissing,
    /// Anything else: shut down with exit code 1.
    Fatal,
}

/// Distinguish the missing-session-archive fault from genuine fatal faults.
///
/// The io source is usually stringified by the time it crosses the
/// transport seam, so the message text is matched alongside any `io::Error`
/// left in the chain.
pub fn classify_fault(error: &anyhow::Error) -> FaultClass {
    let text_mentions_not_found = |text: &str| {
        let text = text.to_lowercase();
        text.contains("enoent") || text.contains("no such file")
    };
    let not_found = error.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .map(|io| io.kind() == std::io::ErrorKind::NotFound)
            .unwrap_or(false)
            || text_mentions_not_found(&cause.to_string())
    });
    let mentions_archive = error.chain().any(|cause| cause.to_string().contains(".zip"));

    if not_found && mentions_archive {
        FaultClass::ArchiveMissing
    } else {
        FaultClass::Fatal
    }
}

/// Recreate the scratch directory the transport unpacks session archives
/// into, so the next initialize attempt does not trip over the same fault.
pub async fn restore_scratch_dir(path: &Path) -> std::io::Result<()> {
    warn!(path = %path.display(), "recreating session scratch directory");
    tokio::fs::create_dir_all(path).await
}

/// Runs the fixed teardown sequence and reports the exit code the process
/// should terminate with.
pub struct ShutdownCoordinator {
    store: Arc<dyn SessionStore>,
    controller: Arc<ClientController>,
    config: ShutdownConfig,
}

impl ShutdownCoordinator {
    pub fn new(
        store: Arc<dyn SessionStore>,
        controller: Arc<ClientController>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            store,
            controller,
            config,
        }
    }

    /// Run the teardown sequence. Returns the exit code to terminate with;
    /// the caller owns the actual `process::exit`.
    pub async fn execute(&self, monitor: Option<MonitorHandle>, exit_code: i32) -> i32 {
        info!(exit_code, "shutdown initiated");

        if let Some(monitor) = monitor {
            monitor.stop();
            info!("health monitor stopped");
        }

        // The flush runs as its own task: the bounded wait limits how long
        // teardown blocks on it, the persist itself is never cancelled
        // mid-write and may still settle in the background.
        let flush_wait = Duration::from_secs(self.config.flush_wait_secs);
        let controller = Arc::clone(&self.controller);
        let flush = tokio::spawn(async move { controller.flush().await });
        match tokio::time::timeout(flush_wait, flush).await {
            Ok(Ok(Ok(()))) => info!("final session save completed"),
            Ok(Ok(Err(e))) => warn!("final session save failed: {}", e),
            Ok(Err(e)) => warn!("final session save task failed: {}", e),
            Err(_) => warn!(
                "final session save did not settle within {}s, letting it finish in the background",
                self.config.flush_wait_secs
            ),
        }

        if let Err(e) = self.controller.destroy().await {
            error!("client destroy failed during shutdown: {}", e);
        }

        if let Err(e) = self.store.close().await {
            error!("store close failed during shutdown: {}", e);
        }

        info!("shutdown complete");
        exit_code
    }
}

/// Block until a termination signal arrives. Resolves to the exit code for a
/// signal-triggered shutdown.
#[cfg(unix)]
pub async fn wait_for_signal() -> i32 {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
            unreachable!()
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!("failed to install SIGINT handler: {}", e);
            std::future::pending::<()>().await;
            unreachable!()
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
    0
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> i32 {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to wait for ctrl-c: {}", e);
    } else {
        info!("ctrl-c received");
    }
    0
}
