//! Directory registry: the reference directory agent.
//!
//! [`DirectoryRegistry`] is a thread-safe multi-map from `(userId, dataType)`
//! to provider addresses. Providers are kept in registration order, so a
//! lookup answers in the order agents announced themselves; registering the
//! same data source twice keeps a single entry.
//!
//! [`DirectoryHandler`] exposes the registry over RPC with the `register`,
//! `unregister` and `find` methods agents call.

use crate::message::RpcFault;
use crate::peer::RpcHandler;

use async_trait::async_trait;
use cape_types::datasource::DataSource;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Thread-safe registry of data sources.
#[derive(Debug, Clone, Default)]
pub struct DirectoryRegistry {
    sources: Arc<RwLock<Vec<DataSource>>>,
}

impl DirectoryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a data source. Returns false if it was already registered.
    pub fn register(&self, source: DataSource) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        if sources.contains(&source) {
            return false;
        }
        sources.push(source);
        true
    }

    /// Remove a data source. Returns false if it was not registered.
    pub fn unregister(&self, source: &DataSource) -> bool {
        let mut sources = self.sources.write().unwrap_or_else(|e| e.into_inner());
        let before = sources.len();
        sources.retain(|s| s != source);
        sources.len() != before
    }

    /// All data sources serving `data_type` for `user_id`, in registration order.
    pub fn find(&self, user_id: &str, data_type: &str) -> Vec<DataSource> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources
            .iter()
            .filter(|s| s.serves(user_id, data_type))
            .cloned()
            .collect()
    }

    /// All registered data sources.
    pub fn all(&self) -> Vec<DataSource> {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.clone()
    }

    /// Number of registered data sources.
    pub fn len(&self) -> usize {
        let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
        sources.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DataSourceParams {
    data_source: DataSource,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindParams {
    user_id: String,
    data_type: String,
}

/// RPC face of a [`DirectoryRegistry`].
#[derive(Debug, Clone, Default)]
pub struct DirectoryHandler {
    registry: DirectoryRegistry,
}

impl DirectoryHandler {
    /// Serve `registry` over RPC.
    pub fn new(registry: DirectoryRegistry) -> Self {
        Self { registry }
    }

    /// The registry behind this handler.
    pub fn registry(&self) -> &DirectoryRegistry {
        &self.registry
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcFault> {
    serde_json::from_value(params).map_err(RpcFault::invalid_params)
}

#[async_trait]
impl RpcHandler for DirectoryHandler {
    async fn handle_call(
        &self,
        method: &str,
        params: serde_json::Value,
        sender: Option<&str>,
    ) -> Result<serde_json::Value, RpcFault> {
        match method {
            "register" => {
                let DataSourceParams { data_source } = parse(params)?;
                info!(source = %data_source, ?sender, "directory: register");
                self.registry.register(data_source);
                Ok(serde_json::Value::Null)
            }
            "unregister" => {
                let DataSourceParams { data_source } = parse(params)?;
                info!(source = %data_source, ?sender, "directory: unregister");
                self.registry.unregister(&data_source);
                Ok(serde_json::Value::Null)
            }
            "find" => {
                let FindParams { user_id, data_type } = parse(params)?;
                let found = self.registry.find(&user_id, &data_type);
                info!(
                    user_id = %user_id,
                    data_type = %data_type,
                    count = found.len(),
                    "directory: find"
                );
                serde_json::to_value(found).map_err(RpcFault::handler)
            }
            other => Err(RpcFault::method_not_found(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{INVALID_PARAMS, METHOD_NOT_FOUND};
    use cape_types::datasource::{CONTACTS, DIALOG};
    use serde_json::json;

    #[test]
    fn test_register_and_find() {
        let registry = DirectoryRegistry::new();
        assert!(registry.register(DataSource::new("alice", "peer://42", CONTACTS)));

        let found = registry.find("alice", CONTACTS);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].agent_url, "peer://42");
        assert!(registry.find("alice", DIALOG).is_empty());
        assert!(registry.find("bob", CONTACTS).is_empty());
    }

    #[test]
    fn test_duplicate_register_keeps_one() {
        let registry = DirectoryRegistry::new();
        assert!(registry.register(DataSource::new("alice", "peer://42", DIALOG)));
        assert!(!registry.register(DataSource::new("alice", "peer://42", DIALOG)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = DirectoryRegistry::new();
        registry.register(DataSource::new("alice", "peer://first", DIALOG));
        registry.register(DataSource::new("alice", "peer://second", DIALOG));

        let found = registry.find("alice", DIALOG);
        assert_eq!(found[0].agent_url, "peer://first");
        assert_eq!(found[1].agent_url, "peer://second");
    }

    #[test]
    fn test_unregister_exact_match_only() {
        let registry = DirectoryRegistry::new();
        registry.register(DataSource::new("alice", "peer://42", DIALOG));
        assert!(!registry.unregister(&DataSource::new("alice", "peer://43", DIALOG)));
        assert!(registry.unregister(&DataSource::new("alice", "peer://42", DIALOG)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_handler_methods() {
        let handler = DirectoryHandler::default();
        handler
            .handle_call(
                "register",
                json!({"dataSource": {"userId": "alice", "agentUrl": "peer://42", "dataType": "contacts"}}),
                Some("alice"),
            )
            .await
            .unwrap();

        let found = handler
            .handle_call("find", json!({"userId": "alice", "dataType": "contacts"}), None)
            .await
            .unwrap();
        assert_eq!(found[0]["agentUrl"], "peer://42");

        let none = handler
            .handle_call("find", json!({"userId": "bob", "dataType": "contacts"}), None)
            .await
            .unwrap();
        assert_eq!(none, json!([]));
    }

    #[tokio::test]
    async fn test_handler_rejects_bad_input() {
        let handler = DirectoryHandler::default();
        let err = handler
            .handle_call("register", json!({"userId": "alice"}), None)
            .await
            .unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);

        let err = handler.handle_call("purge", json!({}), None).await.unwrap_err();
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }
}
