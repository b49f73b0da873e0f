//! State stores for CAPE agents.
//!
//! Two backends implement [`cape_types::memory::StateStore`]:
//! - **MemoryStore**: process-local map, lost on restart
//! - **SqliteStore**: `kv_store` table in a SQLite file, survives restarts

pub mod migration;
pub mod structured;
pub mod volatile;

pub use structured::SqliteStore;
pub use volatile::MemoryStore;
