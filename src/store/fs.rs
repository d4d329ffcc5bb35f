use super::{SessionDocument, SessionStore, StoreError, StoreResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs as async_fs;
use tracing::{debug, info, warn};

/// File-backed document store: one JSON file per collection under a data
/// directory, each holding the collection's documents keyed by `_id`.
///
/// Writes go through a temp file followed by a rename so a crash mid-write
/// never leaves a truncated collection behind.
pub struct FsDocumentStore {
    data_dir: PathBuf,
    collection: String,
    closed: AtomicBool,
}

impl FsDocumentStore {
    pub fn new(data_dir: impl Into<PathBuf>, collection: &str) -> Self {
        let data_dir = data_dir.into();
        info!(
            data_dir = %data_dir.display(),
            collection, "initialized file-backed document store"
        );
        Self {
            data_dir,
            collection: collection.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    fn collection_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.json", self.collection))
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "store connection is closed".to_string(),
            ));
        }
        Ok(())
    }

    /// Load all documents in the collection. Absent collection reads as empty.
    async fn load_documents(&self) -> StoreResult<Vec<SessionDocument>> {
        let path = self.collection_path();
        let content = match async_fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "failed to read collection {}: {}",
                    self.collection, e
                )));
            }
        };

        match serde_json::from_slice(&content) {
            Ok(documents) => Ok(documents),
            Err(e) => {
                // A corrupt collection file reads as empty rather than
                // faulting, so the client falls back to re-authentication.
                warn!(
                    collection = %self.collection,
                    "collection file is not valid JSON, treating as empty: {}", e
                );
                Ok(Vec::new())
            }
        }
    }

    /// Persist the full collection atomically (temp file + rename).
    async fn write_documents(&self, documents: &[SessionDocument]) -> StoreResult<()> {
        async_fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to create data dir: {}", e)))?;

        let serialized = serde_json::to_vec_pretty(documents)
            .map_err(|e| StoreError::WriteFailed(format!("failed to serialize collection: {}", e)))?;

        let temp_path = self
            .data_dir
            .join(format!(".{}.{}.tmp", self.collection, uuid::Uuid::new_v4()));

        async_fs::write(&temp_path, &serialized)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("failed to write collection: {}", e)))?;

        if let Err(e) = async_fs::rename(&temp_path, self.collection_path()).await {
            let _ = async_fs::remove_file(&temp_path).await;
            return Err(StoreError::WriteFailed(format!(
                "failed to commit collection write: {}",
                e
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl SessionStore for FsDocumentStore {
    async fn save(&self, session_name: &str, blob: serde_json::Value) -> StoreResult<()> {
        self.ensure_open()?;

        let mut documents = self.load_documents().await?;
        match documents.iter_mut().find(|d| d.id == session_name) {
            Some(existing) => existing.data = blob,
            None => documents.push(SessionDocument {
                id: session_name.to_string(),
                data: blob,
            }),
        }

        self.write_documents(&documents).await?;
        debug!(session_name, "session record upserted");
        Ok(())
    }

    async fn extract(&self, session_name: &str) -> StoreResult<Option<serde_json::Value>> {
        self.ensure_open()?;

        let documents = self.load_documents().await?;
        Ok(documents
            .into_iter()
            .find(|d| d.id == session_name)
            .map(|d| d.data))
    }

    async fn delete(&self, session_name: &str) -> StoreResult<bool> {
        self.ensure_open()?;

        let mut documents = self.load_documents().await?;
        let before = documents.len();
        documents.retain(|d| d.id != session_name);

        if documents.len() == before {
            return Ok(false);
        }

        self.write_documents(&documents).await?;
        info!(session_name, "session record deleted");
        Ok(true)
    }

    async fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn reconnect(&self) -> StoreResult<()> {
        async_fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to open data dir: {}", e)))?;
        self.closed.store(false, Ordering::SeqCst);
        info!(data_dir = %self.data_dir.display(), "store connection established");
        Ok(())
    }

    async fn reset_collection(&self) -> StoreResult<()> {
        self.ensure_open()?;

        let path = self.collection_path();
        match async_fs::remove_file(&path).await {
            Ok(()) => debug!(collection = %self.collection, "collection dropped"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(collection = %self.collection, "collection did not exist")
            }
            Err(e) => {
                return Err(StoreError::WriteFailed(format!(
                    "failed to drop collection: {}",
                    e
                )));
            }
        }

        self.write_documents(&[]).await?;
        info!(collection = %self.collection, "collection recreated empty");
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        info!("store connection closed");
        Ok(())
    }
}

impl FsDocumentStore {
    /// Directory holding this store's data. Exposed for diagnostics only;
    /// never logged alongside credentials.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
