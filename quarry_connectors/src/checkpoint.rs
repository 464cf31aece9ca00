//! Durable cursor storage for resumable syncs.
//!
//! A checkpoint store holds the last [`SyncCursor`] each connector
//! instance reached. It is read when a fetch starts and written after
//! every delivered batch, so a restarted process resumes the walk instead
//! of starting over.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use crate::connector::SyncCursor;

/// Durable slot for the last cursor a connector instance reached.
#[allow(async_fn_in_trait)]
pub trait CheckpointStore: Send + Sync {
    /// Loads the persisted cursor, or `None` if no sync has run yet.
    async fn load(&self, connector_id: &str) -> Result<Option<SyncCursor>>;

    /// Persists the cursor, replacing any previous value.
    async fn save(&self, connector_id: &str, cursor: &SyncCursor) -> Result<()>;

    /// Removes the persisted cursor, forcing the next run to start fresh.
    async fn clear(&self, connector_id: &str) -> Result<()>;
}

/// In-memory checkpoint store for tests and single-process runs.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    cursors: RwLock<HashMap<String, SyncCursor>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, connector_id: &str) -> Result<Option<SyncCursor>> {
        Ok(self.cursors.read().await.get(connector_id).cloned())
    }

    async fn save(&self, connector_id: &str, cursor: &SyncCursor) -> Result<()> {
        self.cursors
            .write()
            .await
            .insert(connector_id.to_string(), cursor.clone());
        Ok(())
    }

    async fn clear(&self, connector_id: &str) -> Result<()> {
        self.cursors.write().await.remove(connector_id);
        Ok(())
    }
}

/// File-backed checkpoint store: one JSON file per connector id.
///
/// Survives process restarts; suitable for the single-writer sync runner.
pub struct JsonCheckpointStore {
    dir: PathBuf,
}

impl JsonCheckpointStore {
    /// Creates a store rooted at `dir`. The directory is created lazily on
    /// the first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, connector_id: &str) -> PathBuf {
        // Connector ids may contain path-hostile characters.
        let safe: String = connector_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

impl CheckpointStore for JsonCheckpointStore {
    async fn load(&self, connector_id: &str) -> Result<Option<SyncCursor>> {
        let path = self.path_for(connector_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint file {}", path.display()))?;
        let cursor = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid checkpoint file {}", path.display()))?;
        Ok(Some(cursor))
    }

    async fn save(&self, connector_id: &str, cursor: &SyncCursor) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create checkpoint directory {}", self.dir.display())
        })?;
        let path = self.path_for(connector_id);
        let contents = serde_json::to_string_pretty(cursor)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write checkpoint file {}", path.display()))?;
        Ok(())
    }

    async fn clear(&self, connector_id: &str) -> Result<()> {
        let path = self.path_for(connector_id);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove checkpoint file {}", path.display()))?;
        }
        Ok(())
    }
}
