//! crates/research_interview_core/src/kv.rs
//!
//! In-memory key-value storage and the "current study" pointer that lives on
//! top of any `KeyValueStore`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::ports::{KeyValueStore, PortResult};

/// Fixed key of the always-local "current study id" pointer.
pub const CURRENT_STUDY_ID_KEY: &str = "user-research-current-study-id";

/// A process-local store. Contents vanish with the process, which is exactly the
/// lifetime of a browsing session's visitor bindings.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// The client-affinity hint naming the study a coordinator is working on.
/// It is not study data and never goes through a `StudyStore`.
#[derive(Clone)]
pub struct CurrentStudyPointer {
    local: Arc<dyn KeyValueStore>,
}

impl CurrentStudyPointer {
    pub fn new(local: Arc<dyn KeyValueStore>) -> Self {
        Self { local }
    }

    pub async fn get(&self) -> PortResult<Option<String>> {
        let id = self.local.get(CURRENT_STUDY_ID_KEY).await?;
        Ok(id.filter(|id| !id.is_empty()))
    }

    /// `None` clears the pointer.
    pub async fn set(&self, id: Option<&str>) -> PortResult<()> {
        match id {
            Some(id) => self.local.set(CURRENT_STUDY_ID_KEY, id).await,
            None => self.local.remove(CURRENT_STUDY_ID_KEY).await,
        }
    }
}
