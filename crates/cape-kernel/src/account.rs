//! Account lifecycle: verify-then-mutate over the credential store.
//!
//! Every mutation that changes connectivity goes through the
//! [`SessionController`].

use crate::credentials::CredentialStore;
use crate::session::SessionController;
use cape_types::credential::Credential;
use cape_types::error::{CapeError, CapeResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sets, changes and removes an agent's transport account.
pub struct AccountManager {
    credentials: CredentialStore,
    session: Arc<SessionController>,
}

impl AccountManager {
    pub fn new(credentials: CredentialStore, session: Arc<SessionController>) -> Self {
        Self {
            credentials,
            session,
        }
    }

    /// Per-field verification against the stored pair; see [`CredentialStore::verify`].
    pub async fn verify(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<bool> {
        self.credentials.verify(username, password).await
    }

    /// Configure the first account and connect with it.
    ///
    /// Fails with [`CapeError::AuthMismatch`] once an account exists; use
    /// [`change_account`](Self::change_account) then.
    pub async fn set_account(
        &self,
        username: &str,
        password: &str,
        resource: Option<&str>,
    ) -> CapeResult<()> {
        if self.credentials.username().await?.is_some() {
            return Err(CapeError::AuthMismatch);
        }
        self.credentials
            .store(&Credential::new(username, password, resource.map(String::from)))
            .await?;
        info!(agent_id = self.credentials.agent_id(), username, "Account set");
        self.session.connect().await
    }

    /// Replace the account after verifying the old pair, then reconnect.
    ///
    /// On mismatch nothing changes.
    pub async fn change_account(
        &self,
        old_username: Option<&str>,
        old_password: Option<&str>,
        username: &str,
        password: &str,
        resource: Option<&str>,
    ) -> CapeResult<()> {
        let verification = self
            .credentials
            .verification(old_username, old_password)
            .await?;
        if !verification.is_ok() {
            warn!(
                agent_id = self.credentials.agent_id(),
                "Account change rejected: old credential does not match"
            );
            return Err(CapeError::AuthMismatch);
        }

        if self.credentials.username().await?.is_some() {
            self.session.disconnect().await?;
        }
        self.credentials
            .store(&Credential::new(username, password, resource.map(String::from)))
            .await?;
        info!(agent_id = self.credentials.agent_id(), username, "Account changed");
        self.session.connect().await
    }

    /// Disconnect and forget the account. A mismatched pair is ignored.
    pub async fn remove_account(&self, username: Option<&str>, password: Option<&str>) -> CapeResult<()> {
        if !self.credentials.verify(username, password).await? {
            debug!(
                agent_id = self.credentials.agent_id(),
                "Ignoring removeAccount with mismatched credential"
            );
            return Ok(());
        }
        if let Err(e) = self.session.disconnect().await {
            debug!(agent_id = self.credentials.agent_id(), error = %e, "Ignoring disconnect failure");
        }
        self.credentials.clear().await?;
        info!(agent_id = self.credentials.agent_id(), "Account removed");
        Ok(())
    }
}
