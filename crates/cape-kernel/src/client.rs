//! Client façade: log in as a user and route through that user's agent.

use crate::agent::{AgentContext, CapeAgent, ContactsProvider, NotificationHandler};
use cape_types::config::DEFAULT_RESOURCE;
use cape_types::datasource::{Contact, ContactFilter};
use cape_types::error::{CapeError, CapeResult};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// One logged-in user at a time, backed by a [`CapeAgent`].
pub struct CapeClient {
    ctx: AgentContext,
    agent_id: Option<String>,
    resource: String,
    agent: Mutex<Option<Arc<CapeAgent>>>,
    notifications: Mutex<Option<Arc<dyn NotificationHandler>>>,
    contacts: Mutex<Option<Arc<dyn ContactsProvider>>>,
}

impl CapeClient {
    /// A client whose agents are built from `ctx`. The agent id defaults to
    /// the login username.
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            agent_id: None,
            resource: DEFAULT_RESOURCE.to_string(),
            agent: Mutex::new(None),
            notifications: Mutex::new(None),
            contacts: Mutex::new(None),
        }
    }

    /// Use a fixed agent id instead of the login username.
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Resource stored when an account is first created.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Handler installed on every agent this client logs in.
    pub fn on_notification(&self, handler: Arc<dyn NotificationHandler>) {
        if let Some(agent) = self.current() {
            agent.set_notification_handler(Arc::clone(&handler));
        }
        *self.notifications.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Contacts provider installed on every agent this client logs in.
    pub fn serve_contacts(&self, provider: Arc<dyn ContactsProvider>) {
        if let Some(agent) = self.current() {
            agent.set_contacts_provider(Arc::clone(&provider));
        }
        *self.contacts.lock().unwrap_or_else(|e| e.into_inner()) = Some(provider);
    }

    fn current(&self) -> Option<Arc<CapeAgent>> {
        self.agent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The logged-in agent.
    pub fn agent(&self) -> CapeResult<Arc<CapeAgent>> {
        self.current().ok_or(CapeError::NotLoggedIn)
    }

    /// Log in as `username`, replacing any current login.
    ///
    /// The first login stores the account; later ones must present the same
    /// credential.
    pub async fn login(&self, username: &str, password: &str) -> CapeResult<Arc<CapeAgent>> {
        self.logout().await;

        let agent_id = self.agent_id.as_deref().unwrap_or(username);
        let agent = CapeAgent::new(agent_id, self.ctx.clone());
        let handler = self.notifications.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(handler) = handler {
            agent.set_notification_handler(handler);
        }
        let provider = self.contacts.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(provider) = provider {
            agent.set_contacts_provider(provider);
        }

        if let Err(e) = self.open(&agent, username, password).await {
            agent.destroy();
            return Err(e);
        }

        *self.agent.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&agent));
        info!(agent_id = agent.id(), username, "Logged in");
        Ok(agent)
    }

    async fn open(&self, agent: &CapeAgent, username: &str, password: &str) -> CapeResult<()> {
        if agent.credentials().username().await?.is_none() {
            return agent
                .set_account(username, password, Some(self.resource.as_str()))
                .await;
        }
        agent
            .credentials()
            .check(Some(username), Some(password))
            .await?;
        agent.connect().await
    }

    /// Disconnect and drop the current agent. Without a login this does nothing.
    pub async fn logout(&self) {
        let current = self.agent.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(agent) = current else {
            return;
        };
        if let Err(e) = agent.disconnect().await {
            warn!(agent_id = agent.id(), error = %e, "Disconnect on logout failed");
        }
        agent.destroy();
        info!(agent_id = agent.id(), "Logged out");
    }

    /// See [`CapeAgent::send_notification`].
    pub async fn send_notification(&self, user_id: Option<&str>, message: &str) -> CapeResult<()> {
        self.agent()?.send_notification(user_id, message).await
    }

    /// See [`CapeAgent::get_contacts`].
    pub async fn get_contacts(&self, filter: Option<&ContactFilter>) -> CapeResult<Vec<Contact>> {
        self.agent()?.get_contacts(filter).await
    }
}
