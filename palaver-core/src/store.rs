//! Session stores for Palaver
//!
//! Provides a `SessionStore` trait with implementations for:
//! - **Memory**: process-local map, lost on restart
//! - **File**: one JSON document per session under a directory, replaced atomically
//!
//! Both honour an optional idle timeout: a session untouched for longer than
//! the timeout loads as absent and is dropped from the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::{SessionBackend, SessionConfig};
use crate::models::SessionData;

// ============================================================================
// SessionStore trait
// ============================================================================

/// Key-value storage for per-browser session state.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `None` for unknown or expired sessions.
    async fn load(&self, id: Uuid) -> Result<Option<SessionData>, StoreError>;

    /// Insert or replace the whole session.
    async fn save(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError>;

    /// Remove the session. Deleting an unknown id is not an error.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Create the store selected by configuration.
pub fn create_store(config: &SessionConfig) -> Box<dyn SessionStore> {
    match config.backend {
        SessionBackend::Memory => Box::new(MemorySessionStore::new(config.idle_timeout())),
        SessionBackend::File => Box::new(FileSessionStore::new(&config.dir, config.idle_timeout())),
    }
}

// ============================================================================
// MemorySessionStore
// ============================================================================

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionData>>,
    idle_timeout: Option<Duration>,
}

impl MemorySessionStore {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<SessionData>, StoreError> {
        let found = self.sessions.read().await.get(&id).cloned();
        match found {
            Some(data) if data.is_expired(self.idle_timeout, Utc::now()) => {
                self.sessions.write().await.remove(&id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    async fn save(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError> {
        self.sessions.write().await.insert(id, data.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.sessions.write().await.remove(&id);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// FileSessionStore
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
    idle_timeout: Option<Duration>,
}

impl FileSessionStore {
    pub fn new(dir: impl AsRef<Path>, idle_timeout: Option<Duration>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            idle_timeout,
        }
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<SessionData>, StoreError> {
        let path = self.path_for(id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let data: SessionData = match serde_json::from_slice(&bytes) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "Discarding unreadable session file");
                self.delete(id).await?;
                return Ok(None);
            }
        };

        if data.is_expired(self.idle_timeout, Utc::now()) {
            tracing::debug!(session = %id, "Session expired");
            self.delete(id).await?;
            return Ok(None);
        }

        Ok(Some(data))
    }

    async fn save(&self, id: Uuid, data: &SessionData) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Each write gets its own temp file so concurrent saves of one session never share it.
        let path = self.path_for(id);
        let tmp = self.dir.join(format!("{}.{}.tmp", id, Uuid::new_v4()));
        let bytes = serde_json::to_vec(data)?;

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}

// ============================================================================
// TESTS
// ============================================================================
