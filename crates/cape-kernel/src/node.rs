//! CapeNode: boots the state store and the wire node from configuration.

use crate::agent::{AgentContext, CapeAgent};
use crate::client::CapeClient;
use crate::error::{KernelError, KernelResult};
use cape_memory::{MemoryStore, SqliteStore};
use cape_types::config::{CapeConfig, MemoryBackend};
use cape_types::memory::StateStore;
use cape_wire::{AgentAddress, DirectoryHandler, DirectoryRegistry, PeerConfig, PeerNode, TcpInvoker};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// A running CAPE node: one listener, one state store, any number of agents.
pub struct CapeNode {
    config: CapeConfig,
    peer: Arc<PeerNode>,
    accept: JoinHandle<()>,
    state: Arc<dyn StateStore>,
    invoker: Arc<TcpInvoker>,
}

impl CapeNode {
    /// Open the configured state store and start listening.
    pub async fn boot(config: CapeConfig) -> KernelResult<Self> {
        let listen_addr: SocketAddr = config.listen_addr.parse().map_err(|e| {
            KernelError::BootFailed(format!("invalid listen_addr '{}': {e}", config.listen_addr))
        })?;

        let state: Arc<dyn StateStore> = match config.memory.backend {
            MemoryBackend::Memory => Arc::new(MemoryStore::new()),
            MemoryBackend::Sqlite => Arc::new(SqliteStore::open(&config.memory.sqlite_path)?),
        };

        let node_name = config
            .agent_id
            .clone()
            .unwrap_or_else(|| "cape-node".to_string());
        let (peer, accept) = PeerNode::start(PeerConfig {
            listen_addr,
            node_name: node_name.clone(),
        })
        .await
        .map_err(|e| KernelError::BootFailed(format!("cannot listen on {listen_addr}: {e}")))?;

        info!(
            node = %node_name,
            addr = %peer.local_addr(),
            backend = ?config.memory.backend,
            directory = %config.directory_url,
            "CAPE node booted"
        );

        Ok(Self {
            config,
            peer,
            accept,
            state,
            invoker: Arc::new(TcpInvoker::with_sender(node_name)),
        })
    }

    pub fn config(&self) -> &CapeConfig {
        &self.config
    }

    /// The wire node.
    pub fn peer(&self) -> &Arc<PeerNode> {
        &self.peer
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.peer.local_addr()
    }

    /// Serve a directory on this node under the username of `directory_url`.
    ///
    /// Returns the registry and the address it is reachable at.
    pub fn serve_directory(&self) -> KernelResult<(DirectoryRegistry, String)> {
        let address: AgentAddress = self
            .config
            .directory_url
            .parse()
            .map_err(|e| KernelError::BootFailed(format!("invalid directory_url: {e}")))?;
        let registry = DirectoryRegistry::new();
        let url = self.peer.serve(
            &address.username,
            Arc::new(DirectoryHandler::new(registry.clone())),
        );
        Ok((registry, url))
    }

    /// Collaborators for agents living on this node.
    pub fn context(&self) -> AgentContext {
        AgentContext {
            state: Arc::clone(&self.state),
            transport: Some(self.peer.clone()),
            invoker: self.invoker.clone(),
            directory_url: self.config.directory_url.clone(),
        }
    }

    /// Create agent `id` on this node.
    pub fn spawn_agent(&self, id: &str) -> Arc<CapeAgent> {
        CapeAgent::new(id, self.context())
    }

    /// A login façade over this node.
    pub fn client(&self) -> CapeClient {
        let client = CapeClient::new(self.context()).with_resource(&self.config.default_resource);
        match &self.config.agent_id {
            Some(agent_id) => client.with_agent_id(agent_id),
            None => client,
        }
    }

    /// Stop accepting connections.
    pub fn shutdown(self) {
        self.accept.abort();
        info!(addr = %self.peer.local_addr(), "CAPE node stopped");
    }
}
