use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;

use super::model::{Execution, Flow};
use super::{ExecutionStore, ExecutionUpdate, FlowStore};

/// SQLite-backed local durable tier.
///
/// Documents are stored as JSON alongside the columns the app queries
/// on (`updated_at`, `flow_id`, `status`, `deleted`). All writes go
/// through the connection mutex, which serializes them per store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS flows (
        id TEXT PRIMARY KEY,
        updated_at INTEGER NOT NULL,
        deleted INTEGER NOT NULL DEFAULT 0,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_flows_updated ON flows(updated_at);

    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        flow_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at INTEGER NOT NULL,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_executions_flow
        ON executions(flow_id, started_at);

    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(format!("failed to create db directory: {e}")))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another writer panicked mid-operation;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl FlowStore for SqliteStore {
    async fn upsert(&self, flow: Flow) -> Result<(), StoreError> {
        let doc = serde_json::to_string(&flow)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO flows (id, updated_at, deleted, doc) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                updated_at = excluded.updated_at,
                deleted = excluded.deleted,
                doc = excluded.doc",
            params![
                flow.id,
                flow.updated_at.timestamp_millis(),
                flow.deleted as i64,
                doc
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Flow>, StoreError> {
        let conn = self.lock();
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM flows WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Flow>, StoreError> {
        let conn = self.lock();
        let sql = if include_deleted {
            "SELECT doc FROM flows ORDER BY updated_at DESC"
        } else {
            "SELECT doc FROM flows WHERE deleted = 0 ORDER BY updated_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut flows = Vec::new();
        for doc in rows {
            flows.push(serde_json::from_str(&doc?)?);
        }
        Ok(flows)
    }

    async fn soft_delete(&self, id: &str, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut flow = FlowStore::get(self, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        flow.deleted = true;
        flow.deleted_at = Some(when);
        flow.updated_at = when;
        self.upsert(flow).await
    }

    async fn rekey(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        let mut flow = FlowStore::get(self, old_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(old_id.to_string()))?;
        flow.id = new_id.to_string();
        let doc = serde_json::to_string(&flow)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM flows WHERE id = ?1", params![old_id])?;
        tx.execute(
            "INSERT OR REPLACE INTO flows (id, updated_at, deleted, doc)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                new_id,
                flow.updated_at.timestamp_millis(),
                flow.deleted as i64,
                doc
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.lock();
        let value = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create(&self, execution: Execution) -> Result<(), StoreError> {
        let doc = serde_json::to_string(&execution)?;
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO executions (id, flow_id, status, started_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                execution.id,
                execution.flow_id,
                status_column(execution.status),
                execution.started_at.timestamp_millis(),
                doc
            ],
        )?;
        Ok(())
    }

    async fn finalize(&self, id: &str, update: ExecutionUpdate) -> Result<(), StoreError> {
        let mut execution = ExecutionStore::get(self, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if execution.status.is_terminal() {
            return Ok(());
        }
        execution.status = update.status;
        execution.completed_at = Some(update.completed_at);
        execution.duration = Some(update.duration_ms);
        execution.results = update.results;
        execution.error = update.error;
        execution.failed_node_id = update.failed_node_id;

        let doc = serde_json::to_string(&execution)?;
        let conn = self.lock();
        conn.execute(
            "UPDATE executions SET status = ?2, doc = ?3 WHERE id = ?1",
            params![id, status_column(execution.status), doc],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError> {
        let conn = self.lock();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM executions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    async fn list_for_flow(&self, flow_id: &str) -> Result<Vec<Execution>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT doc FROM executions WHERE flow_id = ?1 ORDER BY started_at DESC",
        )?;
        let rows = stmt.query_map(params![flow_id], |row| row.get::<_, String>(0))?;
        let mut executions = Vec::new();
        for doc in rows {
            executions.push(serde_json::from_str(&doc?)?);
        }
        Ok(executions)
    }
}

fn status_column(status: super::model::ExecutionStatus) -> &'static str {
    use super::model::ExecutionStatus::*;
    match status {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}
