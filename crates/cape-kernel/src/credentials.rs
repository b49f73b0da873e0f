//! Credential Store: the agent's transport identity, kept in its state store.

use cape_types::credential::{Credential, Verification};
use cape_types::error::{CapeError, CapeResult};
use cape_types::memory::StateStore;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

const USERNAME_KEY: &str = "transport_username";
const PASSWORD_KEY: &str = "transport_password";
const RESOURCE_KEY: &str = "transport_resource";

/// Reads, verifies and mutates one agent's stored credential.
#[derive(Clone)]
pub struct CredentialStore {
    agent_id: String,
    state: Arc<dyn StateStore>,
}

impl CredentialStore {
    /// Credential store for `agent_id` backed by `state`.
    pub fn new(agent_id: impl Into<String>, state: Arc<dyn StateStore>) -> Self {
        Self {
            agent_id: agent_id.into(),
            state,
        }
    }

    /// The owning agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Stored username, if any.
    pub async fn username(&self) -> CapeResult<Option<String>> {
        self.state.get_string(&self.agent_id, USERNAME_KEY).await
    }

    /// Stored password, if any.
    pub async fn password(&self) -> CapeResult<Option<Zeroizing<String>>> {
        Ok(self
            .state
            .get_string(&self.agent_id, PASSWORD_KEY)
            .await?
            .map(Zeroizing::new))
    }

    /// Stored resource, if any.
    pub async fn resource(&self) -> CapeResult<Option<String>> {
        self.state.get_string(&self.agent_id, RESOURCE_KEY).await
    }

    /// The full credential, or `None` unless username and password are both set.
    pub async fn load(&self) -> CapeResult<Option<Credential>> {
        let (Some(username), Some(password)) = (self.username().await?, self.password().await?)
        else {
            return Ok(None);
        };
        Ok(Some(Credential {
            username,
            password,
            resource: self.resource().await?,
        }))
    }

    /// Per-field verification of `(username, password)` against the stored pair.
    pub async fn verification(
        &self,
        username: Option<&str>,
        password: Option<&str>,
    ) -> CapeResult<Verification> {
        let stored_username = self.username().await?;
        let stored_password = self.password().await?;
        let verification = Verification::check(
            stored_username.as_deref(),
            stored_password.as_ref().map(|p| p.as_str()),
            username,
            password,
        );
        debug!(
            agent_id = %self.agent_id,
            username = ?verification.username,
            password = ?verification.password,
            "Verified credential"
        );
        Ok(verification)
    }

    /// True if `(username, password)` matches, or nothing is stored yet.
    pub async fn verify(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<bool> {
        Ok(self.verification(username, password).await?.is_ok())
    }

    /// Like [`verify`](Self::verify), but a mismatch is an [`CapeError::AuthMismatch`].
    pub async fn check(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<()> {
        if self.verify(username, password).await? {
            Ok(())
        } else {
            Err(CapeError::AuthMismatch)
        }
    }

    /// Replace the stored credential. An absent resource removes the stored one.
    pub async fn store(&self, credential: &Credential) -> CapeResult<()> {
        self.state
            .put(
                &self.agent_id,
                USERNAME_KEY,
                credential.username.clone().into(),
            )
            .await?;
        self.state
            .put(
                &self.agent_id,
                PASSWORD_KEY,
                credential.password.as_str().into(),
            )
            .await?;
        match &credential.resource {
            Some(resource) => {
                self.state
                    .put(&self.agent_id, RESOURCE_KEY, resource.clone().into())
                    .await?
            }
            None => self.state.remove(&self.agent_id, RESOURCE_KEY).await?,
        }
        Ok(())
    }

    /// Remove the stored credential.
    pub async fn clear(&self) -> CapeResult<()> {
        for key in [USERNAME_KEY, PASSWORD_KEY, RESOURCE_KEY] {
            self.state.remove(&self.agent_id, key).await?;
        }
        Ok(())
    }
}
