//! CapeAgent: one user's agent, built from its credential store, session, directory client and router.
//!
//! The agent hosts itself on the transport when created, so inbound calls
//! (`setAccount`, `onNotification`, `getContacts`, ...) reach it as soon as
//! its session is open.

use crate::account::AccountManager;
use crate::credentials::CredentialStore;
use crate::directory::{DirectoryClient, RegistrationLedger};
use crate::routing::RoutingEngine;
use crate::session::{SessionController, SessionState};
use async_trait::async_trait;
use cape_types::datasource::{Contact, ContactFilter};
use cape_types::error::{CapeError, CapeResult};
use cape_types::memory::StateStore;
use cape_wire::message::AGENT_NOT_FOUND;
use cape_wire::{RemoteInvoker, RpcFault, RpcHandler, SessionTransport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, RwLock, Weak};
use tracing::{debug, info};

/// Receives notifications routed to this agent.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Deliver `message`. `sender` identifies the caller when the transport knows it.
    async fn notify(&self, sender: Option<&str>, message: &str) -> CapeResult<()>;
}

/// Serves this agent's contact list.
#[async_trait]
pub trait ContactsProvider: Send + Sync {
    /// Contacts matching `filter`; `None` matches all.
    async fn contacts(&self, filter: Option<&ContactFilter>) -> CapeResult<Vec<Contact>>;
}

/// Default notification handler: writes the message to the log.
pub struct LogNotifications;

#[async_trait]
impl NotificationHandler for LogNotifications {
    async fn notify(&self, sender: Option<&str>, message: &str) -> CapeResult<()> {
        info!(?sender, message, "Notification received");
        Ok(())
    }
}

/// A fixed contact list. A filter matches a contact when every filter field
/// equals the contact's field of the same name.
#[derive(Debug, Clone, Default)]
pub struct StaticContacts {
    contacts: Vec<Contact>,
}

impl StaticContacts {
    pub fn new(contacts: Vec<Contact>) -> Self {
        Self { contacts }
    }

    fn matches(contact: &Contact, filter: &ContactFilter) -> bool {
        filter
            .iter()
            .all(|(field, expected)| contact.get(field) == Some(expected))
    }
}

#[async_trait]
impl ContactsProvider for StaticContacts {
    async fn contacts(&self, filter: Option<&ContactFilter>) -> CapeResult<Vec<Contact>> {
        Ok(match filter {
            Some(filter) => self
                .contacts
                .iter()
                .filter(|c| Self::matches(c, filter))
                .cloned()
                .collect(),
            None => self.contacts.clone(),
        })
    }
}

/// Collaborators an agent is built from.
#[derive(Clone)]
pub struct AgentContext {
    /// Per-agent persistence.
    pub state: Arc<dyn StateStore>,
    /// Session transport; `None` when the process has none registered.
    pub transport: Option<Arc<dyn SessionTransport>>,
    /// Remote invocation primitive.
    pub invoker: Arc<dyn RemoteInvoker>,
    /// Address of the directory agent.
    pub directory_url: String,
}

/// A user's agent.
pub struct CapeAgent {
    id: String,
    transport: Option<Arc<dyn SessionTransport>>,
    credentials: CredentialStore,
    session: Arc<SessionController>,
    accounts: AccountManager,
    directory: Arc<DirectoryClient>,
    routing: RoutingEngine,
    notifications: RwLock<Arc<dyn NotificationHandler>>,
    contacts: RwLock<Option<Arc<dyn ContactsProvider>>>,
}

impl std::fmt::Debug for CapeAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapeAgent")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl CapeAgent {
    /// Build the agent `id` and host it on the context's transport.
    ///
    /// The transport only holds a weak handle: once the last `Arc` is
    /// dropped, inbound calls for `id` fail with a 404 fault.
    pub fn new(id: impl Into<String>, ctx: AgentContext) -> Arc<Self> {
        let id = id.into();
        let credentials = CredentialStore::new(id.clone(), Arc::clone(&ctx.state));
        let session = Arc::new(SessionController::new(
            credentials.clone(),
            ctx.transport.clone(),
        ));
        let directory = Arc::new(DirectoryClient::new(
            ctx.directory_url,
            credentials.clone(),
            Arc::clone(&ctx.invoker),
            RegistrationLedger::new(id.clone(), ctx.state),
        ));
        let agent = Arc::new(Self {
            accounts: AccountManager::new(credentials.clone(), Arc::clone(&session)),
            routing: RoutingEngine::new(id.clone(), Arc::clone(&directory), ctx.invoker),
            id,
            transport: ctx.transport,
            credentials,
            session,
            directory,
            notifications: RwLock::new(Arc::new(LogNotifications)),
            contacts: RwLock::new(None),
        });
        if let Some(transport) = &agent.transport {
            transport.host(&agent.id, Arc::new(Hosted(Arc::downgrade(&agent))));
        }
        debug!(agent_id = %agent.id, "Agent created");
        agent
    }

    /// Stop receiving inbound calls. The session is left as is.
    pub fn destroy(&self) {
        if let Some(transport) = &self.transport {
            transport.unhost(&self.id);
        }
        debug!(agent_id = %self.id, "Agent destroyed");
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The agent's stored credential.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The agent's directory client.
    pub fn directory(&self) -> &DirectoryClient {
        &self.directory
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Transport address while connected.
    pub fn address(&self) -> Option<String> {
        self.session.address()
    }

    /// Replace the notification handler.
    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.notifications.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    /// Install the contacts provider served through `getContacts`.
    pub fn set_contacts_provider(&self, provider: Arc<dyn ContactsProvider>) {
        *self.contacts.write().unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    // --- account ---------------------------------------------------------

    pub async fn verify(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<bool> {
        self.accounts.verify(username, password).await
    }

    pub async fn set_account(&self, username: &str, password: &str, resource: Option<&str>) -> CapeResult<()> {
        self.accounts.set_account(username, password, resource).await
    }

    pub async fn change_account(
        &self,
        old_username: Option<&str>,
        old_password: Option<&str>,
        username: &str,
        password: &str,
        resource: Option<&str>,
    ) -> CapeResult<()> {
        self.accounts
            .change_account(old_username, old_password, username, password, resource)
            .await
    }

    pub async fn remove_account(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<()> {
        self.accounts.remove_account(username, password).await
    }

    // --- session ---------------------------------------------------------

    pub async fn connect(&self) -> CapeResult<()> {
        self.session.connect().await
    }

    pub async fn disconnect(&self) -> CapeResult<()> {
        self.session.disconnect().await
    }

    // --- directory -------------------------------------------------------

    async fn own_source(&self) -> CapeResult<(String, String)> {
        let username = self
            .credentials
            .username()
            .await?
            .ok_or(CapeError::NoIdentity)?;
        let address = self.address().ok_or_else(|| {
            CapeError::TransportUnavailable(format!(
                "agent '{}' has no transport address; connect first",
                self.id
            ))
        })?;
        Ok((username, address))
    }

    /// Register this agent as provider of `data_type` for its own user.
    pub async fn offer(&self, data_type: &str) -> CapeResult<()> {
        let (username, address) = self.own_source().await?;
        self.directory.register(&username, &address, data_type).await
    }

    /// Withdraw an [`offer`](Self::offer).
    pub async fn withdraw(&self, data_type: &str) -> CapeResult<()> {
        let (username, address) = self.own_source().await?;
        self.directory.unregister(&username, &address, data_type).await
    }

    /// Re-announce every recorded offer under this agent's current username
    /// and address, withdrawing the ones made under an earlier identity.
    pub async fn reoffer_all(&self) -> CapeResult<usize> {
        let (username, address) = self.own_source().await?;
        self.directory.reregister_all(&username, &address).await
    }

    /// Addresses serving `data_type` for `user_id`.
    pub async fn find(&self, user_id: &str, data_type: &str) -> CapeResult<Vec<String>> {
        self.directory.find(user_id, data_type).await
    }

    // --- routing ---------------------------------------------------------

    pub async fn send_notification(&self, user_id: Option<&str>, message: &str) -> CapeResult<()> {
        self.routing.send_notification(user_id, message).await
    }

    pub async fn get_contacts(&self, filter: Option<&ContactFilter>) -> CapeResult<Vec<Contact>> {
        self.routing.get_contacts(filter).await
    }

    // --- inbound ---------------------------------------------------------

    async fn serve_contacts(&self, filter_text: &str) -> CapeResult<String> {
        let provider = self
            .contacts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| CapeError::no_provider(&self.id, cape_types::datasource::CONTACTS))?;
        let filter: Option<ContactFilter> = if filter_text.trim().is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(filter_text)
                    .map_err(|e| CapeError::Serialization(format!("contact filter: {e}")))?,
            )
        };
        let contacts = provider.contacts(filter.as_ref()).await?;
        serde_json::to_string(&contacts).map_err(|e| CapeError::Serialization(e.to_string()))
    }

    async fn dispatch(
        &self,
        method: &str,
        params: serde_json::Value,
        sender: Option<&str>,
    ) -> Result<serde_json::Value, RpcFault> {
        use serde_json::Value;

        match method {
            "setAccount" => {
                let p: SetAccountParams = parse(params)?;
                self.set_account(&p.username, &p.password, p.resource.as_deref())
                    .await
                    .map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "changeAccount" => {
                let p: ChangeAccountParams = parse(params)?;
                self.change_account(
                    p.old_username.as_deref(),
                    p.old_password.as_deref(),
                    &p.new_username,
                    &p.new_password,
                    p.new_resource.as_deref(),
                )
                .await
                .map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "removeAccount" => {
                let p: RemoveAccountParams = parse(params)?;
                self.remove_account(p.username.as_deref(), p.password.as_deref())
                    .await
                    .map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "connect" => {
                self.connect().await.map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "disconnect" => {
                self.disconnect().await.map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "onNotification" => {
                let p: NotificationParams = parse(params)?;
                let handler = Arc::clone(&*self.notifications.read().unwrap_or_else(|e| e.into_inner()));
                handler
                    .notify(sender, &p.message)
                    .await
                    .map_err(RpcFault::handler)?;
                Ok(Value::Null)
            }
            "getContacts" => {
                let p: ContactsParams = parse(params)?;
                let text = self
                    .serve_contacts(p.filter.as_deref().unwrap_or(""))
                    .await
                    .map_err(RpcFault::handler)?;
                Ok(Value::String(text))
            }
            other => Err(RpcFault::method_not_found(other)),
        }
    }
}

#[async_trait]
impl RpcHandler for CapeAgent {
    async fn handle_call(
        &self,
        method: &str,
        params: serde_json::Value,
        sender: Option<&str>,
    ) -> Result<serde_json::Value, RpcFault> {
        debug!(agent_id = %self.id, method, ?sender, "Inbound call");
        self.dispatch(method, params, sender).await
    }
}

/// Transport-side entry for a hosted agent.
struct Hosted(Weak<CapeAgent>);

#[async_trait]
impl RpcHandler for Hosted {
    async fn handle_call(
        &self,
        method: &str,
        params: serde_json::Value,
        sender: Option<&str>,
    ) -> Result<serde_json::Value, RpcFault> {
        match self.0.upgrade() {
            Some(agent) => agent.handle_call(method, params, sender).await,
            None => Err(RpcFault::new(AGENT_NOT_FOUND, "Agent has been dropped")),
        }
    }
}

fn parse<T: DeserializeOwned>(params: serde_json::Value) -> Result<T, RpcFault> {
    serde_json::from_value(params).map_err(RpcFault::invalid_params)
}

#[derive(Deserialize)]
struct SetAccountParams {
    username: String,
    password: String,
    #[serde(default)]
    resource: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeAccountParams {
    #[serde(default)]
    old_username: Option<String>,
    #[serde(default)]
    old_password: Option<String>,
    new_username: String,
    new_password: String,
    #[serde(default)]
    new_resource: Option<String>,
}

#[derive(Deserialize)]
struct RemoveAccountParams {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Deserialize)]
struct NotificationParams {
    message: String,
}

#[derive(Deserialize)]
struct ContactsParams {
    #[serde(default)]
    filter: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use cape_memory::MemoryStore;
    use cape_types::datasource::DIALOG;
    use cape_wire::message::{HANDLER_FAILED, INVALID_PARAMS, METHOD_NOT_FOUND};
    use cape_wire::{DirectoryHandler, DirectoryRegistry, LocalNetwork};
    use serde_json::json;
    use std::sync::Mutex;

    const DIRECTORY: &str = "local://merlin";

    #[derive(Default)]
    struct Inbox(Mutex<Vec<String>>);

    #[async_trait]
    impl NotificationHandler for Inbox {
        async fn notify(&self, _sender: Option<&str>, message: &str) -> CapeResult<()> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn context(net: &Arc<LocalNetwork>) -> AgentContext {
        AgentContext {
            state: Arc::new(MemoryStore::new()),
            transport: Some(net.clone()),
            invoker: net.clone(),
            directory_url: DIRECTORY.to_string(),
        }
    }

    fn network() -> (Arc<LocalNetwork>, DirectoryRegistry) {
        let registry = DirectoryRegistry::new();
        let net = LocalNetwork::new();
        net.bind(DIRECTORY, Arc::new(DirectoryHandler::new(registry.clone())));
        (net, registry)
    }

    #[tokio::test]
    async fn test_set_account_over_rpc_connects() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));

        agent
            .handle_call(
                "setAccount",
                json!({ "username": "alice", "password": "secret", "resource": "client" }),
                None,
            )
            .await
            .unwrap();
        assert!(net.is_connected("alice"));
        assert_eq!(agent.address().as_deref(), Some("local://alice/client"));
    }

    #[tokio::test]
    async fn test_change_account_mismatch_over_rpc() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        agent.set_account("alice", "secret", None).await.unwrap();

        let fault = agent
            .handle_call(
                "changeAccount",
                json!({
                    "oldUsername": "alice",
                    "oldPassword": "wrong",
                    "newUsername": "eve",
                    "newPassword": "x"
                }),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(fault.code, HANDLER_FAILED);
        assert!(agent.verify(Some("alice"), Some("secret")).await.unwrap());
    }

    #[tokio::test]
    async fn test_change_account_over_rpc() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        agent.set_account("alice", "secret", Some("client")).await.unwrap();

        agent
            .handle_call(
                "changeAccount",
                json!({
                    "oldUsername": "alice",
                    "oldPassword": "secret",
                    "newUsername": "bob",
                    "newPassword": "pw",
                    "newResource": "phone"
                }),
                None,
            )
            .await
            .unwrap();
        let stored = agent.credentials().load().await.unwrap().unwrap();
        assert_eq!(stored.username, "bob");
        assert_eq!(stored.password.as_str(), "pw");
        assert_eq!(agent.address().as_deref(), Some("local://bob/phone"));
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_params() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        let fault = agent.handle_call("explode", json!({}), None).await.unwrap_err();
        assert_eq!(fault.code, METHOD_NOT_FOUND);
        let fault = agent
            .handle_call("setAccount", json!({ "username": 1 }), None)
            .await
            .unwrap_err();
        assert_eq!(fault.code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_offer_requires_connection() {
        let (net, registry) = network();
        let agent = CapeAgent::new("alice", context(&net));
        assert!(matches!(agent.offer(DIALOG).await, Err(CapeError::NoIdentity)));

        agent.set_account("alice", "secret", None).await.unwrap();
        agent.disconnect().await.unwrap();
        assert!(matches!(
            agent.offer(DIALOG).await,
            Err(CapeError::TransportUnavailable(_))
        ));

        agent.connect().await.unwrap();
        agent.offer(DIALOG).await.unwrap();
        assert_eq!(registry.find("alice", DIALOG).len(), 1);

        agent.withdraw(DIALOG).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_notification_round_trip() {
        let (net, _) = network();
        let alice = CapeAgent::new("alice", context(&net));
        let inbox = Arc::new(Inbox::default());
        alice.set_notification_handler(inbox.clone());
        alice.set_account("alice", "secret", None).await.unwrap();
        alice.offer(DIALOG).await.unwrap();

        let bob = CapeAgent::new("bob", context(&net));
        bob.set_account("bob", "pw", None).await.unwrap();
        bob.send_notification(Some("alice"), "hi alice").await.unwrap();

        assert_eq!(*inbox.0.lock().unwrap(), vec!["hi alice".to_string()]);
    }

    #[tokio::test]
    async fn test_get_contacts_filtering() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        agent.set_contacts_provider(Arc::new(StaticContacts::new(vec![
            json!({ "name": "Bob", "city": "Leeds" }),
            json!({ "name": "Carol", "city": "York" }),
        ])));

        let all = agent
            .handle_call("getContacts", json!({ "filter": "" }), None)
            .await
            .unwrap();
        let all: Vec<Contact> = serde_json::from_str(all.as_str().unwrap()).unwrap();
        assert_eq!(all.len(), 2);

        let york = agent
            .handle_call("getContacts", json!({ "filter": r#"{"city":"York"}"# }), None)
            .await
            .unwrap();
        let york: Vec<Contact> = serde_json::from_str(york.as_str().unwrap()).unwrap();
        assert_eq!(york, vec![json!({ "name": "Carol", "city": "York" })]);
    }

    #[tokio::test]
    async fn test_dropped_agent_is_released() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        agent.set_account("alice", "secret", None).await.unwrap();
        let weak = Arc::downgrade(&agent);
        drop(agent);
        assert!(weak.upgrade().is_none());

        let err = net
            .invoke("local://alice", "disconnect", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, cape_wire::WireError::Remote(ref f) if f.code == AGENT_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_destroy_unhosts() {
        let (net, _) = network();
        let agent = CapeAgent::new("alice", context(&net));
        agent.set_account("alice", "secret", None).await.unwrap();
        agent.destroy();

        let err = net
            .invoke("local://alice", "connect", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, cape_wire::WireError::Remote(_)));
    }
}
