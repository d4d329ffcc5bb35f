use super::{SessionStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory store for tests and ephemeral deployments.
///
/// Connectivity and write faults can be injected to exercise the health
/// monitor and shutdown paths.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<String, serde_json::Value>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a dropped connection.
    pub fn set_connected(&self, connected: bool) {
        self.closed.store(!connected, Ordering::SeqCst);
    }

    /// Make subsequent `save` calls fail with `WriteFailed`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "store connection is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session_name: &str, blob: serde_json::Value) -> StoreResult<()> {
        self.ensure_open()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected write failure".to_string()));
        }
        self.documents
            .write()
            .expect("document map poisoned")
            .insert(session_name.to_string(), blob);
        Ok(())
    }

    async fn extract(&self, session_name: &str) -> StoreResult<Option<serde_json::Value>> {
        self.ensure_open()?;
        Ok(self
            .documents
            .read()
            .expect("document map poisoned")
            .get(session_name)
            .cloned())
    }

    async fn delete(&self, session_name: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self
            .documents
            .write()
            .expect("document map poisoned")
            .remove(session_name)
            .is_some())
    }

    async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> StoreResult<()> {
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.documents
            .write()
            .expect("document map poisoned")
            .clear();
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
