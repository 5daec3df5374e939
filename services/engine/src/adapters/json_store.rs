//! services/engine/src/adapters/json_store.rs
//!
//! A durable adapter for the `KeyValueStore` port: the whole map lives in a
//! single JSON document rewritten on every mutation. The values the engine
//! stores are small (flags, one cached lesson payload per entry), so a full
//! rewrite is cheaper than it sounds and keeps recovery trivial - a corrupt
//! file is simply discarded.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parent_coach_core::ports::{KeyValueStore, PortError, PortResult};
use tokio::sync::Mutex;
use tracing::warn;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `KeyValueStore` port over one JSON file.
pub struct JsonFileStore {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens (or creates) the store at `path`. A missing file starts empty;
    /// an unreadable or corrupt file is logged and also starts empty, since
    /// every value the engine persists has a safe absent-default.
    pub async fn open(path: PathBuf) -> Self {
        let items = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Store file {} is corrupt, starting empty: {}", path.display(), e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read store file {}: {}", path.display(), e);
                HashMap::new()
            }
        };
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    async fn persist(&self, items: &HashMap<String, String>) -> PortResult<()> {
        let raw = serde_json::to_string(items)
            .map_err(|e| PortError::Unexpected(format!("Failed to encode store: {}", e)))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write store file: {}", e)))
    }
}

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value.to_string());
        self.persist(&items).await
    }

    async fn remove_item(&self, key: &str) -> PortResult<()> {
        let mut items = self.items.lock().await;
        items.remove(key);
        self.persist(&items).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> PortResult<Vec<String>> {
        Ok(self
            .items
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
