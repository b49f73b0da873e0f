//! PeerNode: TCP server and client for the CAPE wire protocol.
//!
//! A [`PeerNode`] binds a local TCP listener and dispatches incoming
//! requests to the agents it hosts. An agent only receives calls while it has
//! an open session on the node (see [`SessionTransport`]); always-on services
//! such as the directory are attached with [`PeerNode::serve`] instead.
//!
//! [`TcpInvoker`] is the client side: one connection per call, one request,
//! one response.

use crate::address::{AgentAddress, CAPE_SCHEME};
use crate::message::*;
use crate::transport::{RemoteInvoker, Session, SessionTransport};

use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Errors from the wire protocol layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: u32, max: u32 },
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Remote error: {0}")]
    Remote(RpcFault),
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),
}

impl From<WireError> for cape_types::error::CapeError {
    fn from(e: WireError) -> Self {
        cape_types::error::CapeError::RemoteCall(e.to_string())
    }
}

/// Maximum single message size (16 MB).
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Configuration for a PeerNode.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Address to bind the listener on.
    pub listen_addr: SocketAddr,
    /// This node's human-readable name.
    pub node_name: String,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            node_name: "cape-node".to_string(),
        }
    }
}

/// Receives method calls addressed to one agent.
#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    /// Handle `method` with named `params`.
    async fn handle_call(
        &self,
        method: &str,
        params: serde_json::Value,
        sender: Option<&str>,
    ) -> Result<serde_json::Value, RpcFault>;
}

/// The local network node: listens for connections and hosts agents.
pub struct PeerNode {
    config: PeerConfig,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    /// Agent handlers by agent id; reachable only with an open session.
    hosted: DashMap<String, Arc<dyn RpcHandler>>,
    /// Always-on handlers by username.
    services: DashMap<String, Arc<dyn RpcHandler>>,
    /// Open sessions by agent id.
    sessions: DashMap<String, Session>,
    start_time: Instant,
}

impl PeerNode {
    /// Create and start listening on the configured address.
    pub async fn start(
        config: PeerConfig,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let local_addr = listener.local_addr()?;

        info!(
            "CAPE: listening on {} (node={})",
            local_addr, config.node_name
        );

        let node = Arc::new(Self {
            config,
            local_addr,
            hosted: DashMap::new(),
            services: DashMap::new(),
            sessions: DashMap::new(),
            start_time: Instant::now(),
        });

        let node_clone = Arc::clone(&node);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, node_clone).await;
        });

        Ok((node, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the node name.
    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Seconds since the node started.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Attach an always-on service under `name` and return its address.
    pub fn serve(&self, name: &str, handler: Arc<dyn RpcHandler>) -> String {
        self.services.insert(name.to_string(), handler);
        let address = AgentAddress::cape(name, &self.local_addr.to_string(), None).to_string();
        info!(service = name, %address, "CAPE: serving");
        address
    }

    /// Snapshot of all open sessions.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|s| s.value().clone()).collect()
    }

    /// Find the handler for a request addressed to `username`.
    fn resolve(&self, username: &str) -> Result<Arc<dyn RpcHandler>, RpcFault> {
        if let Some(service) = self.services.get(username) {
            return Ok(Arc::clone(service.value()));
        }
        let agent_id = self
            .sessions
            .iter()
            .find(|s| s.username == username)
            .map(|s| s.agent_id.clone());
        match agent_id {
            Some(agent_id) => self
                .hosted
                .get(&agent_id)
                .map(|h| Arc::clone(h.value()))
                .ok_or_else(|| {
                    RpcFault::new(AGENT_NOT_FOUND, format!("Agent not hosted: {username}"))
                }),
            None if self.hosted.contains_key(username) => Err(RpcFault::new(
                AGENT_NOT_CONNECTED,
                format!("Agent not connected: {username}"),
            )),
            None => Err(RpcFault::new(
                AGENT_NOT_FOUND,
                format!("Unknown agent: {username}"),
            )),
        }
    }

    /// Internal accept loop: runs in a spawned task.
    async fn accept_loop(listener: TcpListener, node: Arc<PeerNode>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("CAPE: accepted connection from {}", addr);
                    let node = Arc::clone(&node);
                    tokio::spawn(async move {
                        if let Err(e) = node.connection_loop(stream).await {
                            debug!("CAPE: connection from {} ended: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("CAPE: accept error: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Read/dispatch/write loop for one inbound connection.
    async fn connection_loop(&self, stream: TcpStream) -> Result<(), WireError> {
        let (mut reader, mut writer) = stream.into_split();
        loop {
            let msg = match read_message(&mut reader).await {
                Ok(m) => m,
                Err(WireError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };

            let response = match msg.kind {
                WireMessageKind::Request(request) => {
                    let outcome = self.dispatch(request).await;
                    WireMessage {
                        id: msg.id,
                        kind: WireMessageKind::Response(match outcome {
                            Ok(value) => WireResponse::Result(value),
                            Err(fault) => WireResponse::Error(fault),
                        }),
                    }
                }
                WireMessageKind::Response(_) => {
                    warn!("CAPE: unexpected response message {:?}", msg.id);
                    continue;
                }
            };
            write_message(&mut writer, &response).await?;
        }
    }

    async fn dispatch(&self, request: WireRequest) -> Result<serde_json::Value, RpcFault> {
        let handler = self.resolve(&request.agent)?;
        debug!(
            agent = %request.agent,
            method = %request.method,
            sender = ?request.sender,
            "CAPE: dispatching call"
        );
        handler
            .handle_call(&request.method, request.params, request.sender.as_deref())
            .await
    }
}

#[async_trait]
impl SessionTransport for PeerNode {
    async fn connect(
        &self,
        agent_id: &str,
        username: &str,
        _password: &str,
        resource: Option<&str>,
    ) -> Result<(), WireError> {
        let session = Session::open(agent_id, username, resource);
        if self.sessions.insert(agent_id.to_string(), session).is_some() {
            debug!(agent_id, "CAPE: replaced existing session");
        }
        info!(agent_id, username, "CAPE: session opened");
        Ok(())
    }

    async fn disconnect(&self, agent_id: &str) -> Result<(), WireError> {
        if self.sessions.remove(agent_id).is_some() {
            info!(agent_id, "CAPE: session closed");
        }
        Ok(())
    }

    fn address_of(&self, agent_id: &str) -> Option<String> {
        let session = self.sessions.get(agent_id)?;
        Some(
            AgentAddress::cape(
                &session.username,
                &self.local_addr.to_string(),
                session.resource.as_deref(),
            )
            .to_string(),
        )
    }

    fn host(&self, agent_id: &str, handler: Arc<dyn RpcHandler>) {
        self.hosted.insert(agent_id.to_string(), handler);
    }

    fn unhost(&self, agent_id: &str) {
        self.hosted.remove(agent_id);
    }
}

/// Client side of the wire protocol: one TCP connection per call.
#[derive(Debug, Clone, Default)]
pub struct TcpInvoker {
    sender: Option<String>,
}

impl TcpInvoker {
    /// An invoker that does not identify itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// An invoker that sends `sender` with every request.
    pub fn with_sender(sender: impl Into<String>) -> Self {
        Self {
            sender: Some(sender.into()),
        }
    }
}

#[async_trait]
impl RemoteInvoker for TcpInvoker {
    async fn invoke(
        &self,
        address: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, WireError> {
        let target: AgentAddress = address.parse()?;
        let authority = match (target.scheme.as_str(), target.authority.as_deref()) {
            (CAPE_SCHEME, Some(authority)) => authority.to_string(),
            _ => {
                return Err(WireError::InvalidAddress(format!(
                    "{address}: not reachable over TCP"
                )))
            }
        };

        let stream = TcpStream::connect(authority.as_str()).await?;
        let (mut reader, mut writer) = stream.into_split();

        let id = uuid::Uuid::new_v4().to_string();
        let msg = WireMessage {
            id: id.clone(),
            kind: WireMessageKind::Request(WireRequest {
                agent: target.username,
                method: method.to_string(),
                params,
                sender: self.sender.clone(),
            }),
        };
        write_message(&mut writer, &msg).await?;

        let response = read_message(&mut reader).await?;
        if response.id != id {
            return Err(WireError::UnexpectedMessage(format!(
                "response id {} does not match request {id}",
                response.id
            )));
        }
        match response.kind {
            WireMessageKind::Response(WireResponse::Result(value)) => Ok(value),
            WireMessageKind::Response(WireResponse::Error(fault)) => Err(WireError::Remote(fault)),
            WireMessageKind::Request(_) => Err(WireError::UnexpectedMessage(
                "request received in place of a response".to_string(),
            )),
        }
    }
}

/// Write a framed message (4-byte length + JSON).
pub async fn write_message<W>(writer: &mut W, msg: &WireMessage) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_message(msg)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a framed message (4-byte length + JSON).
pub async fn read_message<R>(reader: &mut R) -> Result<WireMessage, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_MESSAGE_SIZE {
        return Err(WireError::MessageTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let msg = decode_message(&body)?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Minimal handler that echoes its params.
    struct EchoHandler;

    #[async_trait]
    impl RpcHandler for EchoHandler {
        async fn handle_call(
            &self,
            method: &str,
            params: serde_json::Value,
            sender: Option<&str>,
        ) -> Result<serde_json::Value, RpcFault> {
            match method {
                "echo" => Ok(json!({"params": params, "sender": sender})),
                other => Err(RpcFault::method_not_found(other)),
            }
        }
    }

    async fn start_node() -> Arc<PeerNode> {
        let (node, _task) = PeerNode::start(PeerConfig::default()).await.unwrap();
        node
    }

    #[tokio::test]
    async fn test_service_roundtrip() {
        let node = start_node().await;
        let address = node.serve("echo", Arc::new(EchoHandler));

        let invoker = TcpInvoker::with_sender("tester");
        let result = invoker
            .invoke(&address, "echo", json!({"n": 1}))
            .await
            .unwrap();
        assert_eq!(result["params"]["n"], 1);
        assert_eq!(result["sender"], "tester");
    }

    #[tokio::test]
    async fn test_unknown_method_is_remote_error() {
        let node = start_node().await;
        let address = node.serve("echo", Arc::new(EchoHandler));

        let err = TcpInvoker::new()
            .invoke(&address, "explode", json!({}))
            .await
            .unwrap_err();
        match err {
            WireError::Remote(fault) => assert_eq!(fault.code, METHOD_NOT_FOUND),
            other => panic!("Expected Remote, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hosted_agent_requires_session() {
        let node = start_node().await;
        node.host("agent-1", Arc::new(EchoHandler));
        let address = format!("cape://agent-1@{}", node.local_addr());

        let err = TcpInvoker::new()
            .invoke(&address, "echo", json!({}))
            .await
            .unwrap_err();
        match err {
            WireError::Remote(fault) => assert_eq!(fault.code, AGENT_NOT_CONNECTED),
            other => panic!("Expected Remote(503), got {other:?}"),
        }

        node.connect("agent-1", "alice", "secret", Some("client"))
            .await
            .unwrap();
        let address = node.address_of("agent-1").unwrap();
        assert_eq!(address, format!("cape://alice@{}/client", node.local_addr()));

        let result = TcpInvoker::new()
            .invoke(&address, "echo", json!({"x": true}))
            .await
            .unwrap();
        assert_eq!(result["params"]["x"], true);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let node = start_node().await;
        node.connect("agent-1", "alice", "secret", None).await.unwrap();
        assert_eq!(node.sessions().len(), 1);

        node.disconnect("agent-1").await.unwrap();
        node.disconnect("agent-1").await.unwrap();
        assert!(node.sessions().is_empty());
        assert!(node.address_of("agent-1").is_none());
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let node = start_node().await;
        let err = TcpInvoker::new()
            .invoke(&format!("cape://ghost@{}", node.local_addr()), "echo", json!({}))
            .await
            .unwrap_err();
        match err {
            WireError::Remote(fault) => assert_eq!(fault.code, AGENT_NOT_FOUND),
            other => panic!("Expected Remote(404), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_local_address_rejected_by_tcp_invoker() {
        let err = TcpInvoker::new()
            .invoke("local://merlin", "find", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, WireError::InvalidAddress(_)));
    }

    #[test]
    fn test_peer_config_default() {
        let config = PeerConfig::default();
        assert_eq!(config.node_name, "cape-node");
        assert_eq!(config.listen_addr.port(), 0);
    }
}
