//! In-process network: sessions and invocation without sockets.
//!
//! [`LocalNetwork`] plays both collaborator roles for agents living in one
//! process. Handlers can also be bound to a fixed address with
//! [`LocalNetwork::bind`], which is how test doubles and the in-process
//! directory are attached. Every invocation is recorded so callers can check
//! which remote calls were issued.

use crate::address::{AgentAddress, LOCAL_SCHEME};
use crate::message::{RpcFault, AGENT_NOT_CONNECTED, AGENT_NOT_FOUND};
use crate::peer::{RpcHandler, WireError};
use crate::transport::{RemoteInvoker, Session, SessionTransport};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// Address the call targeted.
    pub address: String,
    /// Method name.
    pub method: String,
}

/// In-process implementation of [`SessionTransport`] and [`RemoteInvoker`].
#[derive(Default)]
pub struct LocalNetwork {
    hosted: DashMap<String, Arc<dyn RpcHandler>>,
    bound: DashMap<String, Arc<dyn RpcHandler>>,
    sessions: DashMap<String, Session>,
    calls: Mutex<Vec<CallRecord>>,
}

impl LocalNetwork {
    /// Create an empty network.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach `handler` at a fixed `address`, independent of sessions.
    pub fn bind(&self, address: &str, handler: Arc<dyn RpcHandler>) {
        self.bound.insert(address.to_string(), handler);
    }

    /// Snapshot of all invocations issued so far.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Invocations of `method` issued so far.
    pub fn calls_to(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }

    /// Whether `agent_id` has an open session.
    pub fn is_connected(&self, agent_id: &str) -> bool {
        self.sessions.contains_key(agent_id)
    }

    fn resolve(&self, address: &str) -> Result<Arc<dyn RpcHandler>, WireError> {
        if let Some(handler) = self.bound.get(address) {
            return Ok(Arc::clone(handler.value()));
        }

        let target: AgentAddress = address.parse()?;
        if target.scheme != LOCAL_SCHEME {
            return Err(WireError::InvalidAddress(format!(
                "{address}: not reachable in-process"
            )));
        }
        let agent_id = self
            .sessions
            .iter()
            .find(|s| s.username == target.username)
            .map(|s| s.agent_id.clone())
            .ok_or_else(|| {
                WireError::Remote(RpcFault::new(
                    AGENT_NOT_CONNECTED,
                    format!("Agent not connected: {}", target.username),
                ))
            })?;
        self.hosted
            .get(&agent_id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| {
                WireError::Remote(RpcFault::new(
                    AGENT_NOT_FOUND,
                    format!("Agent not hosted: {agent_id}"),
                ))
            })
    }
}

#[async_trait]
impl SessionTransport for LocalNetwork {
    async fn connect(
        &self,
        agent_id: &str,
        username: &str,
        _password: &str,
        resource: Option<&str>,
    ) -> Result<(), WireError> {
        self.sessions.insert(
            agent_id.to_string(),
            Session::open(agent_id, username, resource),
        );
        info!(agent_id, username, "local session opened");
        Ok(())
    }

    async fn disconnect(&self, agent_id: &str) -> Result<(), WireError> {
        if self.sessions.remove(agent_id).is_some() {
            info!(agent_id, "local session closed");
        }
        Ok(())
    }

    fn address_of(&self, agent_id: &str) -> Option<String> {
        let session = self.sessions.get(agent_id)?;
        Some(AgentAddress::local(&session.username, session.resource.as_deref()).to_string())
    }

    fn host(&self, agent_id: &str, handler: Arc<dyn RpcHandler>) {
        self.hosted.insert(agent_id.to_string(), handler);
    }

    fn unhost(&self, agent_id: &str) {
        self.hosted.remove(agent_id);
    }
}

#[async_trait]
impl RemoteInvoker for LocalNetwork {
    async fn invoke(
        &self,
        address: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(CallRecord {
                address: address.to_string(),
                method: method.to_string(),
            });
        debug!(address, method, "local invoke");

        let handler = self.resolve(address)?;
        handler
            .handle_call(method, params, None)
            .await
            .map_err(WireError::Remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Constant(serde_json::Value);

    #[async_trait]
    impl RpcHandler for Constant {
        async fn handle_call(
            &self,
            _method: &str,
            _params: serde_json::Value,
            _sender: Option<&str>,
        ) -> Result<serde_json::Value, RpcFault> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_bound_address() {
        let net = LocalNetwork::new();
        net.bind("peer://42", Arc::new(Constant(json!("pong"))));
        let result = net.invoke("peer://42", "ping", json!({})).await.unwrap();
        assert_eq!(result, "pong");
        assert_eq!(net.calls_to("ping"), 1);
    }

    #[tokio::test]
    async fn test_session_gates_delivery() {
        let net = LocalNetwork::new();
        net.host("a1", Arc::new(Constant(json!(1))));

        let err = net.invoke("local://alice", "x", json!({})).await.unwrap_err();
        assert!(matches!(err, WireError::Remote(ref f) if f.code == AGENT_NOT_CONNECTED));

        net.connect("a1", "alice", "pw", Some("client")).await.unwrap();
        let address = net.address_of("a1").unwrap();
        assert_eq!(address, "local://alice/client");
        assert_eq!(net.invoke(&address, "x", json!({})).await.unwrap(), 1);

        net.disconnect("a1").await.unwrap();
        net.disconnect("a1").await.unwrap();
        assert!(!net.is_connected("a1"));
    }

    #[tokio::test]
    async fn test_unhosted_agent() {
        let net = LocalNetwork::new();
        net.connect("a1", "alice", "pw", None).await.unwrap();
        let err = net.invoke("local://alice", "x", json!({})).await.unwrap_err();
        assert!(matches!(err, WireError::Remote(ref f) if f.code == AGENT_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_foreign_scheme_rejected() {
        let net = LocalNetwork::new();
        let err = net
            .invoke("cape://alice@127.0.0.1:1", "x", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidAddress(_)));
    }
}
