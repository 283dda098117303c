use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::store::{
    Execution, ExecutionStore, Flow, FlowStore, MemoryStore, META_LAST_OPENED,
};

use super::queue::{SyncJob, SyncQueueHandle};
use super::remote::RemoteStore;

/// Keeps the three representations of flow/execution state consistent:
/// the in-memory session cache, the local durable store, and the remote
/// service. All handles are injected; there is no ambient global state.
pub struct Reconciler {
    cache: Arc<MemoryStore>,
    local: Arc<dyn FlowStore>,
    local_executions: Arc<dyn ExecutionStore>,
    remote: Arc<dyn RemoteStore>,
    queue: SyncQueueHandle,
}

impl Reconciler {
    pub fn new(
        cache: Arc<MemoryStore>,
        local: Arc<dyn FlowStore>,
        local_executions: Arc<dyn ExecutionStore>,
        remote: Arc<dyn RemoteStore>,
        queue: SyncQueueHandle,
    ) -> Self {
        Reconciler {
            cache,
            local,
            local_executions,
            remote,
            queue,
        }
    }

    /// Merge one flow present on both sides:
    /// - the remote's global-pin status always wins;
    /// - device-specific provenance is preserved from local;
    /// - everything else comes from whichever side has the more recent
    ///   `updatedAt` (ties keep local).
    pub fn merge_flow(local: &Flow, remote: &Flow) -> Flow {
        let mut merged = if remote.updated_at > local.updated_at {
            remote.clone()
        } else {
            local.clone()
        };
        merged.pin_level = remote.pin_level;
        merged.created_on_device = local.created_on_device.clone();
        merged
    }

    /// Pull remote flows and fold them into the local tiers.
    ///
    /// Remote-only flows are adopted wholesale; local-only flows are
    /// retained untouched. A remote fetch failure degrades to the local
    /// view; it never blocks the caller.
    pub async fn reconcile_flows(&self) -> Result<Vec<Flow>, StoreError> {
        let remote_flows = match self.remote.fetch_flows().await {
            Ok(flows) => flows,
            Err(e) => {
                warn!(error = %e, "remote flow fetch failed; using local state");
                return self.local.list(false).await;
            }
        };

        let local_flows = self.local.list(true).await?;
        let mut by_id: HashMap<String, Flow> = local_flows
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        for remote_flow in remote_flows {
            let merged = match by_id.get(&remote_flow.id) {
                Some(local_flow) => Self::merge_flow(local_flow, &remote_flow),
                None => remote_flow,
            };
            self.local.upsert(merged.clone()).await?;
            FlowStore::upsert(&*self.cache, merged.clone()).await?;
            by_id.insert(merged.id.clone(), merged);
        }

        let mut flows: Vec<Flow> = by_id.into_values().filter(|f| !f.deleted).collect();
        flows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(flows)
    }

    /// Execution history for one flow: session cache first, then the
    /// local store, then the remote API. Never fatal; any failure is
    /// logged and treated as "no history".
    pub async fn execution_history(&self, flow_id: &str) -> Vec<Execution> {
        match ExecutionStore::list_for_flow(&*self.cache, flow_id).await {
            Ok(cached) if !cached.is_empty() => return cached,
            Ok(_) => {}
            Err(e) => warn!(flow_id, error = %e, "execution cache read failed"),
        }

        match self.local_executions.list_for_flow(flow_id).await {
            Ok(stored) if !stored.is_empty() => {
                self.seed_execution_cache(&stored).await;
                return stored;
            }
            Ok(_) => {}
            Err(e) => warn!(flow_id, error = %e, "local execution read failed"),
        }

        match self.remote.fetch_executions(flow_id).await {
            Ok(fetched) => {
                self.seed_execution_cache(&fetched).await;
                fetched
            }
            Err(e) => {
                warn!(flow_id, error = %e, "remote execution fetch failed");
                Vec::new()
            }
        }
    }

    async fn seed_execution_cache(&self, executions: &[Execution]) {
        for execution in executions {
            if let Err(e) = ExecutionStore::create(&*self.cache, execution.clone()).await {
                debug!(error = %e, "execution cache seed failed");
            }
        }
    }

    /// Save protocol: upsert locally (bumping `updatedAt`), mirror into
    /// the cache, then enqueue a best-effort, non-blocking remote push.
    /// The queue worker re-keys the record if the remote assigns a
    /// different id.
    pub async fn save_flow(&self, mut flow: Flow) -> Result<Flow, StoreError> {
        flow.touch();
        self.local.upsert(flow.clone()).await?;
        FlowStore::upsert(&*self.cache, flow.clone()).await?;
        if !self.queue.enqueue(SyncJob::PushFlow(Box::new(flow.clone()))) {
            debug!(flow_id = %flow.id, "sync queue unavailable; save stays local");
        }
        Ok(flow)
    }

    /// Soft delete everywhere reachable; nothing is physically removed.
    pub async fn delete_flow(&self, id: &str) -> Result<(), StoreError> {
        let when = Utc::now();
        self.local.soft_delete(id, when).await?;
        if let Err(e) = FlowStore::soft_delete(&*self.cache, id, when).await {
            debug!(flow_id = %id, error = %e, "cache had no record to delete");
        }
        self.queue.enqueue(SyncJob::DeleteFlow(id.to_string()));
        Ok(())
    }

    /// Track which flow the editor has open; moved by the sync queue if
    /// the record is re-keyed.
    pub async fn mark_opened(&self, id: &str) -> Result<(), StoreError> {
        self.local.set_meta(META_LAST_OPENED, id).await
    }

    pub async fn last_opened(&self) -> Result<Option<String>, StoreError> {
        self.local.get_meta(META_LAST_OPENED).await
    }
}
