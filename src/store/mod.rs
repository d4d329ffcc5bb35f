//! Pluggable document store holding the persisted session record.
//!
//! One document per deployment, shaped `{ "_id": <session-name>, "data": <blob> }`,
//! upserted by name. `extract` deliberately treats a missing collection and a
//! missing record the same way (`Ok(None)`) so callers can fall back to QR
//! re-authentication instead of failing on a fresh install.

mod fs;
mod memory;


pub use fs::FsDocumentStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Faults a store implementation may surface. Not-found conditions are never
/// errors; only connectivity and write failures are.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store write failed: {0}")]
    WriteFailed(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persisted session record as stored in the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub data: serde_json::Value,
}

/// Contract for the session store adapter.
///
/// At most one record exists per session name; `save` is an upsert and must
/// create the backing collection lazily if it is absent.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Upsert the session blob under the given name.
    async fn save(&self, session_name: &str, blob: serde_json::Value) -> StoreResult<()>;

    /// Fetch the session blob, or `None` when the collection or record is
    /// absent. Only connectivity faults produce an error.
    async fn extract(&self, session_name: &str) -> StoreResult<Option<serde_json::Value>>;

    /// Delete the session record. Returns whether a record was removed.
    async fn delete(&self, session_name: &str) -> StoreResult<bool>;

    /// Whether the underlying connection is currently usable.
    async fn is_connected(&self) -> bool;

    /// Attempt to re-establish the underlying connection.
    async fn reconnect(&self) -> StoreResult<()>;

    /// Drop the collection and recreate it empty. Used by administrative
    /// session cleanup.
    async fn reset_collection(&self) -> StoreResult<()>;

    /// Close the underlying connection. Further calls fail with
    /// [`StoreError::Unavailable`] until `reconnect`.
    async fn close(&self) -> StoreResult<()>;
}
