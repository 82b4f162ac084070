//! SQLite persistence for conversation records, one row per record.
//!
//! Idempotent append relies on a unique index over `(agent_id, dedup_key)`.
//! SQLite treats NULLs as distinct, so records appended without a key never
//! conflict.

use std::path::Path;

use rusqlite::{Connection, params};

use bondlink_core::types::{AgentId, ConversationRecord};

use crate::error::StoreError;
use crate::store::{AppendOutcome, ConversationStore};

/// SQLite-backed conversation store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database at the given path and run migrations.
    /// Missing parent directories are created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS conversation_records (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id     TEXT NOT NULL,
                dedup_key    TEXT,
                kind         TEXT NOT NULL,
                received_at  TEXT NOT NULL,
                record_json  TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_records_agent_dedup
                ON conversation_records (agent_id, dedup_key);
            CREATE INDEX IF NOT EXISTS idx_records_agent_seq
                ON conversation_records (agent_id, seq);",
        )?;
        Ok(())
    }

    /// Number of stored records for one agent.
    #[cfg(test)]
    fn count(&self, agent: &AgentId) -> Result<usize, StoreError> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM conversation_records WHERE agent_id = ?1",
            params![agent.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    /// Whether a dedup key is already stored for the agent.
    #[cfg(test)]
    fn contains_key(&self, agent: &AgentId, dedup_key: &str) -> Result<bool, StoreError> {
        use rusqlite::OptionalExtension;

        let hit: Option<i64> = self
            .conn
            .query_row(
                "SELECT seq FROM conversation_records WHERE agent_id = ?1 AND dedup_key = ?2",
                params![agent.as_str(), dedup_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(hit.is_some())
    }
}

impl ConversationStore for SqliteStore {
    fn append(
        &mut self,
        agent: &AgentId,
        record: &ConversationRecord,
        dedup_key: Option<&str>,
    ) -> Result<AppendOutcome, StoreError> {
        let record_json = serde_json::to_string(record)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO conversation_records
                (agent_id, dedup_key, kind, received_at, record_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                agent.as_str(),
                dedup_key,
                record.kind.as_str(),
                record.received_at.to_rfc3339(),
                record_json,
            ],
        )?;
        Ok(if inserted == 0 {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::Appended
        })
    }

    fn read_all(&self, agent: &AgentId) -> Result<Vec<ConversationRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, record_json FROM conversation_records
             WHERE agent_id = ?1 ORDER BY seq",
        )?;
        let rows = stmt.query_map(params![agent.as_str()], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (seq, json) = row?;
            match serde_json::from_str::<ConversationRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(agent = %agent, seq, "skipping undecodable record: {e}");
                }
            }
        }
        Ok(records)
    }

    fn remove(&mut self, agent: &AgentId) -> Result<usize, StoreError> {
        let removed = self.conn.execute(
            "DELETE FROM conversation_records WHERE agent_id = ?1",
            params![agent.as_str()],
        )?;
        Ok(removed)
    }

    fn agent_ids(&self) -> Result<Vec<AgentId>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT agent_id FROM conversation_records ORDER BY agent_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(AgentId::from(row?));
        }
        Ok(ids)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
