//! Debounced autosave as an explicit state machine driven by a single
//! task, instead of timer-clearing scattered across call sites.
//!
//! Content changes schedule a delayed save; a new change resets the
//! delay (trailing debounce). The flush path bypasses the delay for
//! critical moments: flow switch, explicit save, page unload.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::store::Flow;

use super::reconciler::Reconciler;

#[derive(Debug, Clone, PartialEq)]
pub enum AutosaveState {
    Idle,
    /// A save is scheduled; the deadline moves on every new edit.
    Pending,
    Saving,
    Saved,
    /// The save failed; shown as a degraded-save indicator, editing
    /// continues.
    Error(String),
}

enum AutosaveCmd {
    Schedule(Box<Flow>),
    Flush,
    Shutdown,
}

/// Handle to the autosave task.
pub struct Autosave {
    commands: mpsc::UnboundedSender<AutosaveCmd>,
    state: watch::Receiver<AutosaveState>,
}

impl Autosave {
    pub fn spawn(reconciler: Arc<Reconciler>, delay: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(AutosaveState::Idle);
        tokio::spawn(run_autosave(reconciler, delay, cmd_rx, state_tx));
        Autosave {
            commands: cmd_tx,
            state: state_rx,
        }
    }

    /// Record the latest content and (re)start the debounce timer.
    pub fn schedule(&self, flow: Flow) {
        let _ = self.commands.send(AutosaveCmd::Schedule(Box::new(flow)));
    }

    /// Save the pending content now, skipping the remaining delay.
    pub fn flush(&self) {
        let _ = self.commands.send(AutosaveCmd::Flush);
    }

    /// Flush pending content and stop the task.
    pub fn shutdown(&self) {
        let _ = self.commands.send(AutosaveCmd::Shutdown);
    }

    /// Observable state for the UI's save indicator.
    pub fn state(&self) -> watch::Receiver<AutosaveState> {
        self.state.clone()
    }
}

async fn run_autosave(
    reconciler: Arc<Reconciler>,
    delay: Duration,
    mut commands: mpsc::UnboundedReceiver<AutosaveCmd>,
    state: watch::Sender<AutosaveState>,
) {
    let mut pending: Option<Flow> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => tokio::select! {
                cmd = commands.recv() => cmd,
                _ = tokio::time::sleep_until(at) => {
                    save(&reconciler, &state, &mut pending, &mut deadline).await;
                    continue;
                }
            },
            None => commands.recv().await,
        };

        match command {
            Some(AutosaveCmd::Schedule(flow)) => {
                pending = Some(*flow);
                deadline = Some(Instant::now() + delay);
                let _ = state.send(AutosaveState::Pending);
            }
            Some(AutosaveCmd::Flush) => {
                save(&reconciler, &state, &mut pending, &mut deadline).await;
            }
            Some(AutosaveCmd::Shutdown) | None => {
                save(&reconciler, &state, &mut pending, &mut deadline).await;
                break;
            }
        }
    }
    debug!("autosave task stopped");
}

async fn save(
    reconciler: &Reconciler,
    state: &watch::Sender<AutosaveState>,
    pending: &mut Option<Flow>,
    deadline: &mut Option<Instant>,
) {
    *deadline = None;
    let Some(flow) = pending.take() else {
        return;
    };
    let _ = state.send(AutosaveState::Saving);
    match reconciler.save_flow(flow).await {
        Ok(_) => {
            let _ = state.send(AutosaveState::Saved);
        }
        Err(e) => {
            warn!(error = %e, "autosave failed");
            let _ = state.send(AutosaveState::Error(e.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::store::{Execution, ExecutionStore, FlowStore, MemoryStore};
    use crate::sync::queue::{SyncQueue, SyncQueueConfig};
    use crate::sync::remote::RemoteStore;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NullRemote;

    #[async_trait]
    impl RemoteStore for NullRemote {
        async fn fetch_flows(&self) -> Result<Vec<Flow>, SyncError> {
            Ok(vec![])
        }
        async fn push_flow(&self, flow: &Flow) -> Result<String, SyncError> {
            Ok(flow.id.clone())
        }
        async fn delete_flow(&self, _id: &str) -> Result<(), SyncError> {
            Ok(())
        }
        async fn fetch_executions(&self, _flow_id: &str) -> Result<Vec<Execution>, SyncError> {
            Ok(vec![])
        }
    }

    fn reconciler(local: Arc<MemoryStore>) -> Arc<Reconciler> {
        let (queue, _outcomes) = SyncQueue::spawn(
            Arc::new(NullRemote),
            local.clone() as Arc<dyn FlowStore>,
            Arc::new(MemoryStore::new()),
            SyncQueueConfig::default(),
            CancellationToken::new(),
        );
        Arc::new(Reconciler::new(
            Arc::new(MemoryStore::new()),
            local.clone(),
            local as Arc<dyn ExecutionStore>,
            Arc::new(NullRemote),
            queue,
        ))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_for_saved(state: &mut watch::Receiver<AutosaveState>) {
        loop {
            if *state.borrow() == AutosaveState::Saved {
                return;
            }
            state.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn new_edits_reset_the_trailing_debounce() {
        let local = Arc::new(MemoryStore::new());
        let autosave = Autosave::spawn(reconciler(local.clone()), Duration::from_millis(100));
        let mut state = autosave.state();

        let mut flow = Flow::new("v1");
        let id = flow.id.clone();
        autosave.schedule(flow.clone());
        settle().await;

        tokio::time::advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(*state.borrow(), AutosaveState::Pending);

        flow.name = "v2".into();
        autosave.schedule(flow);
        settle().await;

        // 120ms after the first edit, past the original deadline, but
        // the second edit reset it, so nothing has saved yet.
        tokio::time::advance(Duration::from_millis(60)).await;
        settle().await;
        assert_eq!(*state.borrow(), AutosaveState::Pending);

        tokio::time::advance(Duration::from_millis(50)).await;
        wait_for_saved(&mut state).await;

        let stored = FlowStore::get(&*local, &id).await.unwrap().unwrap();
        assert_eq!(stored.name, "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn flush_bypasses_the_delay() {
        let local = Arc::new(MemoryStore::new());
        let autosave = Autosave::spawn(reconciler(local.clone()), Duration::from_secs(3600));
        let mut state = autosave.state();
        let started = Instant::now();

        let flow = Flow::new("urgent");
        let id = flow.id.clone();
        autosave.schedule(flow);
        settle().await;
        autosave.flush();
        wait_for_saved(&mut state).await;

        // Saved without the hour-long deadline ever firing.
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(FlowStore::get(&*local, &id).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn flush_without_pending_content_is_a_no_op() {
        let local = Arc::new(MemoryStore::new());
        let autosave = Autosave::spawn(reconciler(local.clone()), Duration::from_millis(10));
        autosave.flush();
        settle().await;
        assert_eq!(*autosave.state().borrow(), AutosaveState::Idle);
        assert_eq!(local.flow_count(), 0);
    }
}
