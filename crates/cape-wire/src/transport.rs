//! Collaborator contracts between agents and the transport.
//!
//! [`SessionTransport`] opens and closes an agent's session and delivers
//! inbound calls to hosted agents. [`RemoteInvoker`] calls a named method on
//! a peer by address. Both are implemented by the TCP [`PeerNode`] and
//! [`TcpInvoker`], and in-process by [`LocalNetwork`].
//!
//! [`PeerNode`]: crate::peer::PeerNode
//! [`TcpInvoker`]: crate::peer::TcpInvoker
//! [`LocalNetwork`]: crate::local::LocalNetwork

use crate::peer::{RpcHandler, WireError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// An open transport session for one agent.
#[derive(Debug, Clone)]
pub struct Session {
    /// Agent that owns the session.
    pub agent_id: String,
    /// Username the session was opened with.
    pub username: String,
    /// Resource the session was opened with.
    pub resource: Option<String>,
    /// When the session was opened.
    pub connected_at: DateTime<Utc>,
}

impl Session {
    /// A session opened now.
    pub fn open(agent_id: &str, username: &str, resource: Option<&str>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            username: username.to_string(),
            resource: resource.map(String::from),
            connected_at: Utc::now(),
        }
    }
}

/// Opens and closes transport sessions, keyed by agent id.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Open a session for `agent_id`. Replaces any existing session.
    async fn connect(
        &self,
        agent_id: &str,
        username: &str,
        password: &str,
        resource: Option<&str>,
    ) -> Result<(), WireError>;

    /// Close the session for `agent_id`. A missing session is not an error.
    async fn disconnect(&self, agent_id: &str) -> Result<(), WireError>;

    /// Transport address of `agent_id` while its session is open.
    fn address_of(&self, agent_id: &str) -> Option<String>;

    /// Deliver inbound calls for `agent_id` to `handler`.
    fn host(&self, agent_id: &str, handler: Arc<dyn RpcHandler>);

    /// Stop delivering inbound calls for `agent_id`.
    fn unhost(&self, agent_id: &str);
}

/// Invokes a named method on a remote agent.
#[async_trait]
pub trait RemoteInvoker: Send + Sync {
    /// Call `method` with `params` on the agent at `address`.
    async fn invoke(
        &self,
        address: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError>;
}
