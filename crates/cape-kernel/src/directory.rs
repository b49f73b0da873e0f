//! Directory Client: register, unregister and find capability providers.
//!
//! All requests target the configured directory address. Successful
//! registrations are also kept in a per-agent ledger in the state store so
//! they can be withdrawn or re-announced later.

use crate::credentials::CredentialStore;
use cape_types::datasource::DataSource;
use cape_types::error::{CapeError, CapeResult};
use cape_types::memory::StateStore;
use cape_wire::RemoteInvoker;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const LEDGER_KEY: &str = "registrations";

/// The data sources one agent has registered, persisted in its state store.
#[derive(Clone)]
pub struct RegistrationLedger {
    agent_id: String,
    state: Arc<dyn StateStore>,
}

impl RegistrationLedger {
    pub fn new(agent_id: impl Into<String>, state: Arc<dyn StateStore>) -> Self {
        Self {
            agent_id: agent_id.into(),
            state,
        }
    }

    /// All recorded registrations, oldest first.
    pub async fn load(&self) -> CapeResult<Vec<DataSource>> {
        match self.state.get(&self.agent_id, LEDGER_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| CapeError::Serialization(format!("registration ledger: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, sources: &[DataSource]) -> CapeResult<()> {
        if sources.is_empty() {
            return self.state.remove(&self.agent_id, LEDGER_KEY).await;
        }
        let value = serde_json::to_value(sources)
            .map_err(|e| CapeError::Serialization(e.to_string()))?;
        self.state.put(&self.agent_id, LEDGER_KEY, value).await
    }

    /// Add `source` unless it is already recorded.
    pub async fn record(&self, source: &DataSource) -> CapeResult<()> {
        let mut sources = self.load().await?;
        if !sources.contains(source) {
            sources.push(source.clone());
            self.save(&sources).await?;
        }
        Ok(())
    }

    /// Drop `source` from the ledger.
    pub async fn forget(&self, source: &DataSource) -> CapeResult<()> {
        let mut sources = self.load().await?;
        let before = sources.len();
        sources.retain(|s| s != source);
        if sources.len() != before {
            self.save(&sources).await?;
        }
        Ok(())
    }
}

/// Talks to the directory on behalf of one agent.
pub struct DirectoryClient {
    directory_url: String,
    credentials: CredentialStore,
    invoker: Arc<dyn RemoteInvoker>,
    ledger: RegistrationLedger,
}

impl DirectoryClient {
    pub fn new(
        directory_url: impl Into<String>,
        credentials: CredentialStore,
        invoker: Arc<dyn RemoteInvoker>,
        ledger: RegistrationLedger,
    ) -> Self {
        Self {
            directory_url: directory_url.into(),
            credentials,
            invoker,
            ledger,
        }
    }

    /// Address of the directory agent.
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    /// The local registration ledger.
    pub fn ledger(&self) -> &RegistrationLedger {
        &self.ledger
    }

    /// Announce that `agent_url` serves `data_type` for `user_id`.
    ///
    /// The directory's reply is ignored; a failed call is returned.
    pub async fn register(&self, user_id: &str, agent_url: &str, data_type: &str) -> CapeResult<()> {
        if self.credentials.username().await?.is_none() {
            return Err(CapeError::NoIdentity);
        }
        let source = DataSource::new(user_id, agent_url, data_type);
        self.invoker
            .invoke(
                &self.directory_url,
                "register",
                json!({ "dataSource": &source }),
            )
            .await?;
        info!(%source, "Registered with directory");
        self.ledger.record(&source).await
    }

    /// Withdraw a registration. Without a configured username this does nothing.
    pub async fn unregister(&self, user_id: &str, agent_url: &str, data_type: &str) -> CapeResult<()> {
        if self.credentials.username().await?.is_none() {
            debug!(
                agent_id = self.credentials.agent_id(),
                "No username set, skipping unregister"
            );
            return Ok(());
        }
        let source = DataSource::new(user_id, agent_url, data_type);
        self.invoker
            .invoke(
                &self.directory_url,
                "unregister",
                json!({ "dataSource": &source }),
            )
            .await?;
        info!(%source, "Unregistered from directory");
        self.ledger.forget(&source).await
    }

    /// Addresses of all agents serving `data_type` for `user_id`, in directory order.
    pub async fn find(&self, user_id: &str, data_type: &str) -> CapeResult<Vec<String>> {
        info!(user_id, data_type, "Querying directory");
        let reply = self
            .invoker
            .invoke(
                &self.directory_url,
                "find",
                json!({ "userId": user_id, "dataType": data_type }),
            )
            .await?;
        let sources: Vec<DataSource> = serde_json::from_value(reply)
            .map_err(|e| CapeError::BadResponse(format!("find reply: {e}")))?;
        let addresses: Vec<String> = sources.into_iter().map(|s| s.agent_url).collect();
        info!(user_id, data_type, found = ?addresses, "Directory answered");
        Ok(addresses)
    }

    /// The first provider the directory names, if any.
    pub async fn find_first(&self, user_id: &str, data_type: &str) -> CapeResult<Option<String>> {
        Ok(self.find(user_id, data_type).await?.into_iter().next())
    }

    /// Withdraw every recorded registration and return how many were sent.
    ///
    /// Stops at the first failure. Without a configured username nothing is
    /// sent and the ledger is kept.
    pub async fn unregister_all(&self) -> CapeResult<usize> {
        if self.credentials.username().await?.is_none() {
            debug!(
                agent_id = self.credentials.agent_id(),
                "No username set, keeping registration ledger"
            );
            return Ok(0);
        }
        let sources = self.ledger.load().await?;
        for source in &sources {
            self.unregister(&source.user_id, &source.agent_url, &source.data_type)
                .await?;
        }
        Ok(sources.len())
    }

    /// Announce every recorded capability again as served by `agent_url`
    /// for `user_id`.
    ///
    /// Entries recorded under another user or address are withdrawn from
    /// the directory and replaced in the ledger. Entries whose announcement
    /// fails are logged and skipped; the number of successful ones is
    /// returned.
    pub async fn reregister_all(&self, user_id: &str, agent_url: &str) -> CapeResult<usize> {
        if self.credentials.username().await?.is_none() {
            return Err(CapeError::NoIdentity);
        }
        let mut announced = 0;
        for stale in self.ledger.load().await? {
            let current = DataSource::new(user_id, agent_url, &stale.data_type);
            if current != stale {
                if let Err(e) = self
                    .unregister(&stale.user_id, &stale.agent_url, &stale.data_type)
                    .await
                {
                    warn!(source = %stale, error = %e, "Could not withdraw stale registration");
                    self.ledger.forget(&stale).await?;
                }
            }
            match self
                .register(&current.user_id, &current.agent_url, &current.data_type)
                .await
            {
                Ok(()) => announced += 1,
                Err(CapeError::NoIdentity) => return Err(CapeError::NoIdentity),
                Err(e) => warn!(source = %current, error = %e, "Re-registration failed"),
            }
        }
        Ok(announced)
    }
}
