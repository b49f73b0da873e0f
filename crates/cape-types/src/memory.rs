//! Per-agent key/value persistence.

use crate::error::CapeResult;
use async_trait::async_trait;

/// Key/value state owned by one agent.
///
/// Implementations decide durability; the core only relies on
/// read-your-writes within a process.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get a value, `None` if the key is absent.
    async fn get(&self, agent_id: &str, key: &str) -> CapeResult<Option<serde_json::Value>>;

    /// Insert or overwrite a value.
    async fn put(&self, agent_id: &str, key: &str, value: serde_json::Value) -> CapeResult<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn remove(&self, agent_id: &str, key: &str) -> CapeResult<()>;

    /// Get a string value. Non-string values read as absent.
    async fn get_string(&self, agent_id: &str, key: &str) -> CapeResult<Option<String>> {
        Ok(self
            .get(agent_id, key)
            .await?
            .and_then(|v| v.as_str().map(String::from)))
    }
}
