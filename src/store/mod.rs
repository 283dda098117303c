//! Persistence tiers: store traits plus the in-memory cache tier and
//! the SQLite-backed local durable tier.
//!
//! Stores are explicitly passed handles (no ambient singletons) so the
//! engine, reconciler, and tests can each inject their own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::ExecutionResult;
use crate::error::StoreError;

pub mod memory;
pub mod model;
pub mod sqlite;

pub use memory::MemoryStore;
pub use model::{Execution, ExecutionStatus, Flow, FlowContent, PinLevel};
pub use sqlite::SqliteStore;

/// Terminal update applied exactly once to a running execution record.
#[derive(Debug, Clone)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<ExecutionResult>,
    pub error: Option<String>,
    pub failed_node_id: Option<String>,
}

/// Flow document store. Writes for a single record id are serialized by
/// every implementation; reads may happen concurrently.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Update-if-exists else create.
    async fn upsert(&self, flow: Flow) -> Result<(), StoreError>;

    /// Fetch by id, soft-deleted records included.
    async fn get(&self, id: &str) -> Result<Option<Flow>, StoreError>;

    /// All flows, newest `updatedAt` first. Soft-deleted records are
    /// excluded unless `include_deleted` is set.
    async fn list(&self, include_deleted: bool) -> Result<Vec<Flow>, StoreError>;

    /// Mark deleted without removing the record.
    async fn soft_delete(&self, id: &str, when: DateTime<Utc>) -> Result<(), StoreError>;

    /// Rename a record in place to a new id (e.g. a remote-assigned
    /// one). Not a duplicate: the old id ceases to exist.
    async fn rekey(&self, old_id: &str, new_id: &str) -> Result<(), StoreError>;

    /// Small key/value side-channel for pointers like "last opened".
    async fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Execution-record store.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn create(&self, execution: Execution) -> Result<(), StoreError>;

    /// Apply a terminal update. Idempotent at-most-once: records already
    /// in a terminal status are left untouched.
    async fn finalize(&self, id: &str, update: ExecutionUpdate) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError>;

    /// History for one flow, newest first.
    async fn list_for_flow(&self, flow_id: &str) -> Result<Vec<Execution>, StoreError>;
}

/// Meta key under which the reconciler tracks the most recently opened
/// flow id.
pub const META_LAST_OPENED: &str = "last-opened-flow";
