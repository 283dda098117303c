//! Background remote-sync queue: pushes are explicit jobs with bounded
//! retry and an observable outcome channel, not fire-and-forget calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SyncError;
use crate::store::{Flow, FlowStore, META_LAST_OPENED};

use super::remote::RemoteStore;

#[derive(Debug, Clone)]
pub enum SyncJob {
    PushFlow(Box<Flow>),
    DeleteFlow(String),
}

/// Result of one processed job, for any observer that cares. The UI
/// may watch these; nothing blocks on them.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Pushed {
        local_id: String,
        remote_id: String,
    },
    Deleted {
        flow_id: String,
    },
    /// The attempt was abandoned; local state stays authoritative.
    Abandoned {
        flow_id: String,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct SyncQueueConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for SyncQueueConfig {
    fn default() -> Self {
        SyncQueueConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Clone)]
pub struct SyncQueueHandle {
    jobs: mpsc::UnboundedSender<SyncJob>,
}

impl SyncQueueHandle {
    /// Enqueue a job; returns false when the worker has shut down.
    pub fn enqueue(&self, job: SyncJob) -> bool {
        self.jobs.send(job).is_ok()
    }
}

pub struct SyncQueue;

impl SyncQueue {
    /// Spawn the worker task. `local` and `cache` are re-keyed in place
    /// when the remote assigns a different id than the local one.
    pub fn spawn(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn FlowStore>,
        cache: Arc<dyn FlowStore>,
        config: SyncQueueConfig,
        cancel: CancellationToken,
    ) -> (SyncQueueHandle, mpsc::UnboundedReceiver<SyncOutcome>) {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<SyncJob>();
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<SyncOutcome>();

        tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = job_rx.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };
                let outcome =
                    process_job(&*remote, &*local, &*cache, &config, &cancel, job).await;
                let _ = outcome_tx.send(outcome);
            }
            debug!("sync queue worker stopped");
        });

        (SyncQueueHandle { jobs: job_tx }, outcome_rx)
    }
}

async fn process_job(
    remote: &dyn RemoteStore,
    local: &dyn FlowStore,
    cache: &dyn FlowStore,
    config: &SyncQueueConfig,
    cancel: &CancellationToken,
    job: SyncJob,
) -> SyncOutcome {
    match job {
        SyncJob::PushFlow(flow) => {
            let local_id = flow.id.clone();
            match with_retries(config, cancel, || remote.push_flow(&flow)).await {
                Ok(remote_id) => {
                    if remote_id != local_id {
                        rekey_tiers(local, cache, &local_id, &remote_id).await;
                    }
                    SyncOutcome::Pushed {
                        local_id,
                        remote_id,
                    }
                }
                Err(e) => {
                    warn!(flow_id = %local_id, error = %e, "remote push abandoned");
                    SyncOutcome::Abandoned {
                        flow_id: local_id,
                        error: e.to_string(),
                    }
                }
            }
        }
        SyncJob::DeleteFlow(flow_id) => {
            match with_retries(config, cancel, || remote.delete_flow(&flow_id)).await {
                // A remote that never saw the flow has nothing to delete.
                Ok(()) | Err(SyncError::NotFound(_)) => SyncOutcome::Deleted { flow_id },
                Err(e) => {
                    warn!(flow_id = %flow_id, error = %e, "remote delete abandoned");
                    SyncOutcome::Abandoned {
                        flow_id,
                        error: e.to_string(),
                    }
                }
            }
        }
    }
}

/// Retry transient failures with linear backoff. A 4xx rejection is
/// final for this attempt; the remote has spoken.
async fn with_retries<T, F, Fut>(
    config: &SyncQueueConfig,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SyncError>>,
{
    let mut last = SyncError::Remote("no attempts made".into());
    for attempt in 1..=config.max_attempts.max(1) {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match call().await {
            Ok(value) => return Ok(value),
            Err(e @ SyncError::Rejected { .. }) | Err(e @ SyncError::NotFound(_)) => {
                return Err(e);
            }
            Err(e) => {
                debug!(attempt, error = %e, "sync attempt failed");
                last = e;
            }
        }
        if attempt < config.max_attempts {
            tokio::time::sleep(config.retry_backoff * attempt).await;
        }
    }
    Err(last)
}

/// Rename the record across both local tiers and fix the last-opened
/// pointer when it referenced the old id.
async fn rekey_tiers(local: &dyn FlowStore, cache: &dyn FlowStore, old_id: &str, new_id: &str) {
    if let Err(e) = local.rekey(old_id, new_id).await {
        warn!(old_id, new_id, error = %e, "local rekey failed");
        return;
    }
    if let Err(e) = cache.rekey(old_id, new_id).await {
        // Cache may simply not hold the record yet.
        debug!(old_id, new_id, error = %e, "cache rekey skipped");
    }
    match local.get_meta(META_LAST_OPENED).await {
        Ok(Some(pointer)) if pointer == old_id => {
            if let Err(e) = local.set_meta(META_LAST_OPENED, new_id).await {
                warn!(error = %e, "failed to move last-opened pointer");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to read last-opened pointer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Execution, MemoryStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FlakyRemote {
        /// Failures to serve before succeeding.
        failures_left: Mutex<u32>,
        assigned_id: Option<String>,
        attempts: Mutex<u32>,
    }

    #[async_trait]
    impl RemoteStore for FlakyRemote {
        async fn fetch_flows(&self) -> Result<Vec<Flow>, SyncError> {
            Ok(vec![])
        }

        async fn push_flow(&self, flow: &Flow) -> Result<String, SyncError> {
            *self.attempts.lock() += 1;
            let mut failures = self.failures_left.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(SyncError::Remote("flaky".into()));
            }
            Ok(self
                .assigned_id
                .clone()
                .unwrap_or_else(|| flow.id.clone()))
        }

        async fn delete_flow(&self, _id: &str) -> Result<(), SyncError> {
            Ok(())
        }

        async fn fetch_executions(&self, _flow_id: &str) -> Result<Vec<Execution>, SyncError> {
            Ok(vec![])
        }
    }

    fn fast_config() -> SyncQueueConfig {
        SyncQueueConfig {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn push_retries_transient_failures() {
        let remote = Arc::new(FlakyRemote {
            failures_left: Mutex::new(2),
            assigned_id: None,
            attempts: Mutex::new(0),
        });
        let local = Arc::new(MemoryStore::new());
        let flow = Flow::new("demo");
        FlowStore::upsert(&*local, flow.clone()).await.unwrap();

        let (handle, mut outcomes) = SyncQueue::spawn(
            remote.clone(),
            local.clone(),
            Arc::new(MemoryStore::new()),
            fast_config(),
            CancellationToken::new(),
        );
        assert!(handle.enqueue(SyncJob::PushFlow(Box::new(flow))));

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Pushed { .. }));
        assert_eq!(*remote.attempts.lock(), 3);
    }

    #[tokio::test]
    async fn remote_assigned_id_rekeys_local_and_pointer() {
        let remote = Arc::new(FlakyRemote {
            failures_left: Mutex::new(0),
            assigned_id: Some("remote-7".into()),
            attempts: Mutex::new(0),
        });
        let local = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryStore::new());
        let flow = Flow::new("demo");
        let old_id = flow.id.clone();
        FlowStore::upsert(&*local, flow.clone()).await.unwrap();
        FlowStore::upsert(&*cache, flow.clone()).await.unwrap();
        local.set_meta(META_LAST_OPENED, &old_id).await.unwrap();

        let (handle, mut outcomes) = SyncQueue::spawn(
            remote,
            local.clone(),
            cache.clone(),
            fast_config(),
            CancellationToken::new(),
        );
        handle.enqueue(SyncJob::PushFlow(Box::new(flow)));

        match outcomes.recv().await.unwrap() {
            SyncOutcome::Pushed {
                local_id,
                remote_id,
            } => {
                assert_eq!(local_id, old_id);
                assert_eq!(remote_id, "remote-7");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        assert!(FlowStore::get(&*local, &old_id).await.unwrap().is_none());
        assert!(FlowStore::get(&*local, "remote-7").await.unwrap().is_some());
        assert!(FlowStore::get(&*cache, "remote-7").await.unwrap().is_some());
        assert_eq!(
            local.get_meta(META_LAST_OPENED).await.unwrap().as_deref(),
            Some("remote-7")
        );
    }

    struct RejectingRemote;

    #[async_trait]
    impl RemoteStore for RejectingRemote {
        async fn fetch_flows(&self) -> Result<Vec<Flow>, SyncError> {
            Ok(vec![])
        }

        async fn push_flow(&self, _flow: &Flow) -> Result<String, SyncError> {
            Err(SyncError::Rejected {
                status: 409,
                message: "conflict".into(),
            })
        }

        async fn delete_flow(&self, _id: &str) -> Result<(), SyncError> {
            Ok(())
        }

        async fn fetch_executions(&self, _flow_id: &str) -> Result<Vec<Execution>, SyncError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn rejection_abandons_without_retry_and_keeps_local() {
        let local = Arc::new(MemoryStore::new());
        let flow = Flow::new("demo");
        let id = flow.id.clone();
        FlowStore::upsert(&*local, flow.clone()).await.unwrap();

        let (handle, mut outcomes) = SyncQueue::spawn(
            Arc::new(RejectingRemote),
            local.clone(),
            Arc::new(MemoryStore::new()),
            fast_config(),
            CancellationToken::new(),
        );
        handle.enqueue(SyncJob::PushFlow(Box::new(flow)));

        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Abandoned { .. }));
        // Local state remains authoritative.
        assert!(FlowStore::get(&*local, &id).await.unwrap().is_some());
    }
}
