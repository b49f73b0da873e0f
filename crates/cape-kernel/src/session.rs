//! Session Controller: drives connect/disconnect against the transport.
//!
//! State machine: `Disconnected → Connecting → Connected`, and back to
//! `Disconnected` on disconnect or on a failed connect.

use crate::credentials::CredentialStore;
use cape_types::error::{CapeError, CapeResult};
use cape_wire::SessionTransport;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Connection state of an agent's transport session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session is open.
    Disconnected,
    /// A connect is in flight.
    Connecting,
    /// The transport accepted the session.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
        }
    }
}

/// Opens and closes the agent's transport session from its stored credential.
pub struct SessionController {
    credentials: CredentialStore,
    transport: Option<Arc<dyn SessionTransport>>,
    state: Mutex<SessionState>,
}

impl SessionController {
    /// Controller for the agent behind `credentials`. `transport` is `None`
    /// when no transport is registered for this process.
    pub fn new(credentials: CredentialStore, transport: Option<Arc<dyn SessionTransport>>) -> Self {
        Self {
            credentials,
            transport,
            state: Mutex::new(SessionState::Disconnected),
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn transport(&self) -> CapeResult<&Arc<dyn SessionTransport>> {
        self.transport.as_ref().ok_or_else(|| {
            CapeError::TransportUnavailable("No transport service registered".to_string())
        })
    }

    /// The agent's transport address while connected.
    pub fn address(&self) -> Option<String> {
        self.transport
            .as_ref()
            .and_then(|t| t.address_of(self.credentials.agent_id()))
    }

    /// Open a session with the stored credential.
    ///
    /// Any existing session is closed first; failures of that disconnect are
    /// ignored.
    pub async fn connect(&self) -> CapeResult<()> {
        let agent_id = self.credentials.agent_id();
        let username = self.credentials.username().await?.ok_or_else(|| {
            CapeError::MissingCredential(
                "Cannot connect: no username set. \
                 Please set a username and password using setAccount first."
                    .to_string(),
            )
        })?;
        let password = self.credentials.password().await?.ok_or_else(|| {
            CapeError::MissingCredential(format!(
                "Cannot connect: no password set for user '{username}'. \
                 Please set a username and password using setAccount first."
            ))
        })?;
        let resource = self.credentials.resource().await?;
        let transport = self.transport()?;

        self.set_state(SessionState::Connecting);
        if let Err(e) = transport.disconnect(agent_id).await {
            debug!(agent_id, error = %e, "Ignoring disconnect failure before connect");
        }

        match transport
            .connect(agent_id, &username, &password, resource.as_deref())
            .await
        {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                info!(agent_id, username = %username, "Connected");
                Ok(())
            }
            Err(e) => {
                self.set_state(SessionState::Disconnected);
                warn!(agent_id, error = %e, "Connect failed");
                Err(CapeError::Transport(e.to_string()))
            }
        }
    }

    /// Close the session. Closing a closed session is a no-op.
    pub async fn disconnect(&self) -> CapeResult<()> {
        let agent_id = self.credentials.agent_id();
        let transport = self.transport()?;
        transport
            .disconnect(agent_id)
            .await
            .map_err(|e| CapeError::Transport(e.to_string()))?;
        if self.state() != SessionState::Disconnected {
            info!(agent_id, "Disconnected");
        }
        self.set_state(SessionState::Disconnected);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use cape_memory::MemoryStore;
    use cape_types::credential::Credential;
    use cape_wire::{RpcHandler, WireError};

    /// Transport that records every call and can be told to refuse connects.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub calls: Mutex<Vec<String>>,
        pub refuse: bool,
    }

    impl RecordingTransport {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionTransport for RecordingTransport {
        async fn connect(
            &self,
            agent_id: &str,
            username: &str,
            _password: &str,
            resource: Option<&str>,
        ) -> Result<(), WireError> {
            self.calls.lock().unwrap().push(format!(
                "connect {agent_id} {username} {}",
                resource.unwrap_or("-")
            ));
            if self.refuse {
                return Err(WireError::ConnectionClosed);
            }
            Ok(())
        }

        async fn disconnect(&self, agent_id: &str) -> Result<(), WireError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("disconnect {agent_id}"));
            Ok(())
        }

        fn address_of(&self, agent_id: &str) -> Option<String> {
            Some(format!("local://{agent_id}"))
        }

        fn host(&self, _agent_id: &str, _handler: Arc<dyn RpcHandler>) {}

        fn unhost(&self, _agent_id: &str) {}
    }

    fn credentials() -> CredentialStore {
        CredentialStore::new("agent-1", Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_connect_without_credential_never_calls_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let session = SessionController::new(credentials(), Some(transport.clone()));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, CapeError::MissingCredential(_)));
        assert!(transport.calls().is_empty());
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_disconnects_first() {
        let creds = credentials();
        creds
            .store(&Credential::new("alice", "secret", Some("client".into())))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let session = SessionController::new(creds, Some(transport.clone()));

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(
            transport.calls(),
            vec!["disconnect agent-1", "connect agent-1 alice client"]
        );
    }

    #[tokio::test]
    async fn test_connect_failure_propagates() {
        let creds = credentials();
        creds
            .store(&Credential::new("alice", "secret", None))
            .await
            .unwrap();
        let transport = Arc::new(RecordingTransport {
            refuse: true,
            ..Default::default()
        });
        let session = SessionController::new(creds, Some(transport));

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, CapeError::Transport(_)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_no_transport_registered() {
        let creds = credentials();
        creds
            .store(&Credential::new("alice", "secret", None))
            .await
            .unwrap();
        let session = SessionController::new(creds, None);

        assert!(matches!(
            session.connect().await,
            Err(CapeError::TransportUnavailable(_))
        ));
        assert!(matches!(
            session.disconnect().await,
            Err(CapeError::TransportUnavailable(_))
        ));
        assert!(session.address().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let transport = Arc::new(RecordingTransport::default());
        let session = SessionController::new(credentials(), Some(transport.clone()));
        session.disconnect().await.unwrap();
        session.disconnect().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
