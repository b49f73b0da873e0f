//! Routing Engine: turn a (user, capability) pair into a delivered call.
//!
//! The provider is looked up through the directory and the first address it
//! names is invoked directly. There is no retry and no fallback to the other
//! providers.

use crate::directory::DirectoryClient;
use cape_types::datasource::{Contact, ContactFilter, CONTACTS, DIALOG};
use cape_types::error::{CapeError, CapeResult};
use cape_wire::RemoteInvoker;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes capability calls on behalf of one agent.
pub struct RoutingEngine {
    agent_id: String,
    directory: Arc<DirectoryClient>,
    invoker: Arc<dyn RemoteInvoker>,
}

impl RoutingEngine {
    pub fn new(
        agent_id: impl Into<String>,
        directory: Arc<DirectoryClient>,
        invoker: Arc<dyn RemoteInvoker>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            directory,
            invoker,
        }
    }

    async fn resolve(&self, user_id: &str, data_type: &str) -> CapeResult<String> {
        self.directory
            .find_first(user_id, data_type)
            .await?
            .ok_or_else(|| CapeError::no_provider(user_id, data_type))
    }

    /// Deliver `message` to the dialog provider of `user_id`, or of this
    /// agent when no user is given.
    pub async fn send_notification(&self, user_id: Option<&str>, message: &str) -> CapeResult<()> {
        let user_id = user_id.unwrap_or(&self.agent_id);
        let address = self.resolve(user_id, DIALOG).await?;
        debug!(user_id, %address, "Delivering notification");
        self.invoker
            .invoke(&address, "onNotification", json!({ "message": message }))
            .await?;
        info!(user_id, %address, "Notification delivered");
        Ok(())
    }

    /// Fetch this agent's contacts from its contacts provider.
    ///
    /// An absent filter is sent as empty text, which providers treat as
    /// match-all.
    pub async fn get_contacts(&self, filter: Option<&ContactFilter>) -> CapeResult<Vec<Contact>> {
        let address = self.resolve(&self.agent_id, CONTACTS).await?;
        let filter_text = match filter {
            Some(filter) => serde_json::to_string(filter)
                .map_err(|e| CapeError::Serialization(e.to_string()))?,
            None => String::new(),
        };
        let reply = self
            .invoker
            .invoke(&address, "getContacts", json!({ "filter": filter_text }))
            .await?;
        let text = reply.as_str().ok_or_else(|| {
            CapeError::BadResponse(format!("getContacts reply is not a string: {reply}"))
        })?;
        let contacts: Vec<Contact> = serde_json::from_str(text)
            .map_err(|e| CapeError::BadResponse(format!("getContacts reply: {e}")))?;
        debug!(%address, count = contacts.len(), "Contacts fetched");
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialStore;
    use crate::directory::RegistrationLedger;
    use async_trait::async_trait;
    use cape_memory::MemoryStore;
    use cape_types::credential::Credential;
    use cape_types::datasource::DataSource;
    use cape_types::memory::StateStore;
    use cape_wire::{DirectoryHandler, DirectoryRegistry, LocalNetwork, RpcFault, RpcHandler};
    use std::sync::Mutex;

    const DIRECTORY: &str = "local://merlin";

    /// Records the params of every call and answers with a fixed value.
    struct Provider {
        reply: serde_json::Value,
        seen: Mutex<Vec<serde_json::Value>>,
    }

    impl Provider {
        fn new(reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RpcHandler for Provider {
        async fn handle_call(
            &self,
            _method: &str,
            params: serde_json::Value,
            _sender: Option<&str>,
        ) -> Result<serde_json::Value, RpcFault> {
            self.seen.lock().unwrap().push(params);
            Ok(self.reply.clone())
        }
    }

    async fn setup() -> (RoutingEngine, DirectoryRegistry, Arc<LocalNetwork>) {
        let state: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let credentials = CredentialStore::new("alice", Arc::clone(&state));
        credentials
            .store(&Credential::new("alice", "secret", None))
            .await
            .unwrap();
        let registry = DirectoryRegistry::new();
        let net = LocalNetwork::new();
        net.bind(DIRECTORY, Arc::new(DirectoryHandler::new(registry.clone())));
        let directory = Arc::new(DirectoryClient::new(
            DIRECTORY,
            credentials,
            net.clone(),
            RegistrationLedger::new("alice", state),
        ));
        (RoutingEngine::new("alice", directory, net.clone()), registry, net)
    }

    #[tokio::test]
    async fn test_notification_without_provider() {
        let (routing, _, net) = setup().await;
        let err = routing
            .send_notification(Some("bob"), "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, CapeError::NoProvider { ref user_id, .. } if user_id == "bob"));
        assert_eq!(net.calls_to("onNotification"), 0);
    }

    #[tokio::test]
    async fn test_notification_defaults_to_own_agent() {
        let (routing, registry, net) = setup().await;
        let provider = Provider::new(serde_json::Value::Null);
        net.bind("peer://dialog", provider.clone());
        registry.register(DataSource::new("alice", "peer://dialog", DIALOG));

        routing.send_notification(None, "hello").await.unwrap();
        assert_eq!(provider.seen.lock().unwrap()[0], json!({ "message": "hello" }));
    }

    #[tokio::test]
    async fn test_first_responder_wins() {
        let (routing, registry, net) = setup().await;
        let first = Provider::new(serde_json::Value::Null);
        let second = Provider::new(serde_json::Value::Null);
        net.bind("peer://1", first.clone());
        net.bind("peer://2", second.clone());
        registry.register(DataSource::new("bob", "peer://1", DIALOG));
        registry.register(DataSource::new("bob", "peer://2", DIALOG));

        routing.send_notification(Some("bob"), "hi").await.unwrap();
        assert_eq!(first.seen.lock().unwrap().len(), 1);
        assert!(second.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_contacts_sends_filter_text() {
        let (routing, registry, net) = setup().await;
        let provider = Provider::new(json!(r#"[{"name":"Bob"}]"#));
        net.bind("peer://contacts", provider.clone());
        registry.register(DataSource::new("alice", "peer://contacts", CONTACTS));

        let contacts = routing.get_contacts(None).await.unwrap();
        assert_eq!(contacts, vec![json!({ "name": "Bob" })]);

        let mut filter = ContactFilter::new();
        filter.insert("name".into(), json!("Bob"));
        routing.get_contacts(Some(&filter)).await.unwrap();

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0], json!({ "filter": "" }));
        assert_eq!(seen[1], json!({ "filter": r#"{"name":"Bob"}"# }));
    }

    #[tokio::test]
    async fn test_get_contacts_bad_reply() {
        let (routing, registry, net) = setup().await;
        net.bind("peer://contacts", Provider::new(json!([1, 2])));
        registry.register(DataSource::new("alice", "peer://contacts", CONTACTS));

        let err = routing.get_contacts(None).await.unwrap_err();
        assert!(matches!(err, CapeError::BadResponse(_)));
    }

    #[tokio::test]
    async fn test_get_contacts_without_provider() {
        let (routing, _, net) = setup().await;
        assert!(matches!(
            routing.get_contacts(None).await,
            Err(CapeError::NoProvider { .. })
        ));
        assert_eq!(net.calls_to("getContacts"), 0);
    }
}
