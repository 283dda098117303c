use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StoreError;

use super::model::{Execution, Flow};
use super::{ExecutionStore, ExecutionUpdate, FlowStore};

/// In-memory store tier: the session cache in production, and the
/// injectable fake in tests.
#[derive(Default)]
pub struct MemoryStore {
    flows: RwLock<HashMap<String, Flow>>,
    executions: RwLock<HashMap<String, Execution>>,
    meta: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flow_count(&self) -> usize {
        self.flows.read().len()
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn upsert(&self, flow: Flow) -> Result<(), StoreError> {
        self.flows.write().insert(flow.id.clone(), flow);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Flow>, StoreError> {
        Ok(self.flows.read().get(id).cloned())
    }

    async fn list(&self, include_deleted: bool) -> Result<Vec<Flow>, StoreError> {
        let mut flows: Vec<Flow> = self
            .flows
            .read()
            .values()
            .filter(|f| include_deleted || !f.deleted)
            .cloned()
            .collect();
        flows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(flows)
    }

    async fn soft_delete(&self, id: &str, when: DateTime<Utc>) -> Result<(), StoreError> {
        let mut flows = self.flows.write();
        let flow = flows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        flow.deleted = true;
        flow.deleted_at = Some(when);
        flow.updated_at = when;
        Ok(())
    }

    async fn rekey(&self, old_id: &str, new_id: &str) -> Result<(), StoreError> {
        let mut flows = self.flows.write();
        let mut flow = flows
            .remove(old_id)
            .ok_or_else(|| StoreError::NotFound(old_id.to_string()))?;
        flow.id = new_id.to_string();
        flows.insert(new_id.to_string(), flow);
        Ok(())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.meta.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.meta.read().get(key).cloned())
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create(&self, execution: Execution) -> Result<(), StoreError> {
        self.executions
            .write()
            .insert(execution.id.clone(), execution);
        Ok(())
    }

    async fn finalize(&self, id: &str, update: ExecutionUpdate) -> Result<(), StoreError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(id)
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
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Execution>, StoreError> {
        Ok(self.executions.read().get(id).cloned())
    }

    async fn list_for_flow(&self, flow_id: &str) -> Result<Vec<Execution>, StoreError> {
        let mut executions: Vec<Execution> = self
            .executions
            .read()
            .values()
            .filter(|e| e.flow_id == flow_id)
            .cloned()
            .collect();
        executions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(executions)
    }
}
