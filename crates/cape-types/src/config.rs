//! Configuration types for a CAPE node.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default directory agent address.
pub const DEFAULT_DIRECTORY_URL: &str = "cape://merlin@127.0.0.1:4100";

/// Default listen address for the wire node.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4100";

/// Resource used when an account is created without one.
pub const DEFAULT_RESOURCE: &str = "client";

/// Top-level node configuration (`~/.cape/config.toml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CapeConfig {
    /// Identifier of the local agent. Defaults to the login username.
    pub agent_id: Option<String>,
    /// Address of the directory agent all register/unregister/find calls target.
    pub directory_url: String,
    /// Address the wire node binds to.
    pub listen_addr: String,
    /// Resource stored with a freshly created account.
    pub default_resource: String,
    /// State store settings.
    pub memory: MemoryConfig,
}

impl Default for CapeConfig {
    fn default() -> Self {
        Self {
            agent_id: None,
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            default_resource: DEFAULT_RESOURCE.to_string(),
            memory: MemoryConfig::default(),
        }
    }
}

/// Which state store backs per-agent key/value persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    /// Process-local, lost on restart.
    #[default]
    Memory,
    /// SQLite file, survives restarts.
    Sqlite,
}

/// State store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Backend selection.
    pub backend: MemoryBackend,
    /// Database path for the SQLite backend.
    pub sqlite_path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            backend: MemoryBackend::Memory,
            sqlite_path: cape_home().join("state.db"),
        }
    }
}

/// `~/.cape`, or `./.cape` when no home directory can be resolved.
pub fn cape_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".cape"))
        .unwrap_or_else(|| PathBuf::from(".cape"))
}
