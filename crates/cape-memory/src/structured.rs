//! SQLite structured store for per-agent key/value state.

use crate::migration::run_migrations;
use async_trait::async_trait;
use cape_types::error::{CapeError, CapeResult};
use cape_types::memory::StateStore;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Key/value store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> CapeResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| CapeError::Memory(e.to_string()))?;
        debug!(path = %path.display(), "Opened state database");
        Self::from_connection(conn)
    }

    /// In-memory database, mostly for tests.
    pub fn open_in_memory() -> CapeResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CapeError::Memory(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CapeResult<Self> {
        run_migrations(&conn).map_err(|e| CapeError::Memory(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// List all key-value pairs for an agent.
    pub fn list_kv(&self, agent_id: &str) -> CapeResult<Vec<(String, serde_json::Value)>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv_store WHERE agent_id = ?1 ORDER BY key")
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        let rows = stmt
            .query_map(rusqlite::params![agent_id], |row| {
                let key: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((key, blob))
            })
            .map_err(|e| CapeError::Memory(e.to_string()))?;

        let mut pairs = Vec::new();
        for row in rows {
            let (key, blob) = row.map_err(|e| CapeError::Memory(e.to_string()))?;
            let value: serde_json::Value = serde_json::from_slice(&blob)
                .map_err(|e| CapeError::Serialization(e.to_string()))?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, agent_id: &str, key: &str) -> CapeResult<Option<serde_json::Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        let mut stmt = conn
            .prepare("SELECT value FROM kv_store WHERE agent_id = ?1 AND key = ?2")
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        let result = stmt.query_row(rusqlite::params![agent_id, key], |row| {
            let blob: Vec<u8> = row.get(0)?;
            Ok(blob)
        });
        match result {
            Ok(blob) => {
                let value: serde_json::Value = serde_json::from_slice(&blob)
                    .map_err(|e| CapeError::Serialization(e.to_string()))?;
                Ok(Some(value))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(CapeError::Memory(e.to_string())),
        }
    }

    async fn put(&self, agent_id: &str, key: &str, value: serde_json::Value) -> CapeResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        let blob =
            serde_json::to_vec(&value).map_err(|e| CapeError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO kv_store (agent_id, key, value, version, updated_at) VALUES (?1, ?2, ?3, 1, ?4)
             ON CONFLICT(agent_id, key) DO UPDATE SET value = ?3, version = version + 1, updated_at = ?4",
            rusqlite::params![agent_id, key, blob, now],
        )
        .map_err(|e| CapeError::Memory(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, agent_id: &str, key: &str) -> CapeResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapeError::Memory(e.to_string()))?;
        conn.execute(
            "DELETE FROM kv_store WHERE agent_id = ?1 AND key = ?2",
            rusqlite::params![agent_id, key],
        )
        .map_err(|e| CapeError::Memory(e.to_string()))?;
        Ok(())
    }
}
