//! Transport implementation that drives an external automation-driver
//! process over newline-delimited JSON.
//!
//! The driver owns the actual browser session; this side owns its lifecycle.
//! Events flow driver → bridge on stdout (`{"event": "qr", ...}` etc.),
//! commands flow bridge → driver on stdin (`{"op": "initialize"}` etc.).

use crate::client::transport::{Transport, TransportError, TransportEvent};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

/// One JSON line emitted by the driver process.
#[derive(Debug, Deserialize)]
struct DriverMessage {
    event: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    connected: Option<bool>,
}

/// Decode a driver stdout line into a transport event.
///
/// `connectivity` messages update the liveness flag without producing an
/// event; an unknown event name is logged and skipped.
fn parse_driver_event(line: &str) -> Option<DriverLine> {
    let message: DriverMessage = match serde_json::from_str(line) {
        Ok(message) => message,
        Err(e) => {
            debug!("ignoring non-JSON driver output: {}", e);
            return None;
        }
    };

    let line = match message.event.as_str() {
        "qr" => DriverLine::Event(TransportEvent::Qr {
            encoded_image: message.image.unwrap_or_default(),
        }),
        "authenticated" => DriverLine::Event(TransportEvent::Authenticated {
            session_id: message.session_id,
        }),
        "ready" => DriverLine::Event(TransportEvent::Ready),
        "remote_session_saved" => DriverLine::Event(TransportEvent::RemoteSessionSaved),
        "disconnected" => DriverLine::Event(TransportEvent::Disconnected {
            reason: message.reason.unwrap_or_else(|| "unknown".to_string()),
        }),
        "auth_failure" => DriverLine::Event(TransportEvent::AuthFailure {
            message: message.message.unwrap_or_else(|| "unknown".to_string()),
        }),
        "connectivity" => DriverLine::Connectivity(message.connected.unwrap_or(false)),
        other => {
            debug!(event = other, "ignoring unknown driver event");
            return None;
        }
    };
    Some(line)
}

#[derive(Debug, PartialEq)]
enum DriverLine {
    Event(TransportEvent),
    /// Liveness report with no lifecycle event attached. A `false` here with
    /// no matching `disconnected` event is exactly the drift the health
    /// monitor looks for.
    Connectivity(bool),
}

#[derive(Default)]
struct DriverFlags {
    authenticated: AtomicBool,
    connected: AtomicBool,
    closing: AtomicBool,
}

/// Transport backed by a spawned driver process.
pub struct ProcessTransport {
    command: String,
    args: Vec<String>,
    events: mpsc::UnboundedSender<TransportEvent>,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    flags: Arc<DriverFlags>,
}

impl ProcessTransport {
    pub fn new(
        command: String,
        args: Vec<String>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            command,
            args,
            events,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            flags: Arc::new(DriverFlags::default()),
        }
    }

    /// Write one op line to the driver. The caller wraps the message in the
    /// variant matching the operation that failed.
    async fn send_op(&self, op: &str) -> Result<(), String> {
        let mut stdin = self.stdin.lock().await;
        let writer = stdin
            .as_mut()
            .ok_or_else(|| "driver stdin not open".to_string())?;

        let mut line = json!({"op": op}).to_string();
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("driver write failed: {}", e))?;
        writer
            .flush()
            .await
            .map_err(|e| format!("driver write failed: {}", e))?;
        Ok(())
    }

    async fn spawn_driver(&self) -> Result<(), TransportError> {
        info!(command = %self.command, "spawning automation driver");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::InitFailed(format!("failed to spawn driver: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::InitFailed("driver stdout not captured".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::InitFailed("driver stdin not captured".to_string()))?;

        self.flags.connected.store(true, Ordering::SeqCst);
        self.flags.closing.store(false, Ordering::SeqCst);

        let flags = Arc::clone(&self.flags);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_driver_event(&line) {
                    Some(DriverLine::Event(event)) => {
                        match &event {
                            TransportEvent::Authenticated { .. } => {
                                flags.authenticated.store(true, Ordering::SeqCst);
                            }
                            TransportEvent::Disconnected { .. }
                            | TransportEvent::AuthFailure { .. } => {
                                flags.authenticated.store(false, Ordering::SeqCst);
                            }
                            _ => {}
                        }
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Some(DriverLine::Connectivity(connected)) => {
                        flags.connected.store(connected, Ordering::SeqCst);
                    }
                    None => {}
                }
            }

            // Stream ended: the driver died or was destroyed.
            flags.connected.store(false, Ordering::SeqCst);
            if !flags.closing.load(Ordering::SeqCst) {
                warn!("automation driver exited unexpectedly");
                flags.authenticated.store(false, Ordering::SeqCst);
                let _ = events.send(TransportEvent::Disconnected {
                    reason: "driver process exited".to_string(),
                });
            }
        });

        *self.stdin.lock().await = Some(stdin);
        *self.child.lock().await = Some(child);
        Ok(())
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn initialize(&self) -> Result<(), TransportError> {
        let running = {
            let mut child = self.child.lock().await;
            match child.as_mut() {
                Some(child) => matches!(child.try_wait(), Ok(None)),
                None => false,
            }
        };

        if !running {
            self.spawn_driver().await?;
        }

        self.send_op("initialize")
            .await
            .map_err(TransportError::InitFailed)
    }

    async fn destroy(&self) -> Result<(), TransportError> {
        self.flags.closing.store(true, Ordering::SeqCst);
        self.flags.authenticated.store(false, Ordering::SeqCst);
        self.flags.connected.store(false, Ordering::SeqCst);

        // Best effort: ask the driver to shut down cleanly, then reap it.
        let _ = self.send_op("destroy").await;
        *self.stdin.lock().await = None;

        let mut child = self.child.lock().await;
        if let Some(mut child) = child.take() {
            if let Err(e) = child.kill().await {
                return Err(TransportError::DestroyFailed(format!(
                    "failed to stop driver: {}",
                    e
                )));
            }
        }
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.flags.authenticated.load(Ordering::SeqCst)
    }

    async fn is_connected(&self) -> bool {
        self.flags.connected.load(Ordering::SeqCst)
    }

    async fn persist_session(&self) -> Result<(), TransportError> {
        self.send_op("persist-session")
            .await
            .map_err(TransportError::PersistFailed)
    }
}

/// Factory producing [`ProcessTransport`] handles for the controller.
pub struct ProcessTransportFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessTransportFactory {
    pub fn new(command: String, args: Vec<String>) -> Self {
        Self { command, args }
    }
}

#[async_trait]
impl crate::client::transport::TransportFactory for ProcessTransportFactory {
    async fn create(
        &self,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(ProcessTransport::new(
            self.command.clone(),
            self.args.clone(),
            events,
        )))
    }
}
