//! Process-local state store.

use async_trait::async_trait;
use cape_types::error::CapeResult;
use cape_types::memory::StateStore;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory key/value store keyed by `(agent_id, key)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<(String, String), serde_json::Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all agents.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, agent_id: &str, key: &str) -> CapeResult<Option<serde_json::Value>> {
        Ok(self
            .entries
            .get(&(agent_id.to_string(), key.to_string()))
            .map(|v| v.value().clone()))
    }

    async fn put(&self, agent_id: &str, key: &str, value: serde_json::Value) -> CapeResult<()> {
        self.entries
            .insert((agent_id.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn remove(&self, agent_id: &str, key: &str) -> CapeResult<()> {
        self.entries.remove(&(agent_id.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_roundtrip_and_remove() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.put("a1", "username", json!("alice")).await.unwrap();
        assert_eq!(
            store.get_string("a1", "username").await.unwrap().as_deref(),
            Some("alice")
        );
        assert!(store.get("a2", "username").await.unwrap().is_none());

        store.remove("a1", "username").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.put("a1", "k", json!(true)).await.unwrap();
        assert_eq!(other.get("a1", "k").await.unwrap(), Some(json!(true)));
        assert_eq!(other.len(), 1);
    }
}
