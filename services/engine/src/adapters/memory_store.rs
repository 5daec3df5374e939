//! services/engine/src/adapters/memory_store.rs
//!
//! A purely in-memory adapter for the `KeyValueStore` port. Used by the test
//! suites and by preview builds that must not touch the device store.

use std::collections::HashMap;

use async_trait::async_trait;
use parent_coach_core::ports::{KeyValueStore, PortResult};
use tokio::sync::Mutex;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `KeyValueStore` port over a plain HashMap.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self::default()
    }
}

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_item(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> PortResult<()> {
        self.items
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> PortResult<()> {
        self.items.lock().await.remove(key);
        Ok(())
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
