//! Async completion tracking for server-side executions: submit the
//! graph once, then poll until a terminal status, surfacing rate-limit
//! state and honoring cancellation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SyncError;

use super::orchestrator::RunRequest;

/// Status snapshot reported by the remote runner for one execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePoll {
    pub status: RemoteRunStatus,
    /// Seconds the service asks us to back off, when rate limited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteRunStatus {
    Running,
    RateLimited,
    Completed,
    Failed,
}

/// Remote execution service capability: runs the graph server-side so
/// long calls survive client-side timeouts.
#[async_trait]
pub trait RemoteRunner: Send + Sync {
    /// Submit a graph for execution; returns the execution handle id.
    async fn submit(&self, request: &RunRequest) -> Result<String, SyncError>;

    async fn poll(&self, execution_id: &str) -> Result<RemotePoll, SyncError>;
}

/// Status transitions surfaced to the caller while tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerStatus {
    Running,
    RateLimited { retry_after_secs: u64 },
    Completed,
    Failed { error: String },
}

impl TrackerStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackerStatus::Completed | TrackerStatus::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub interval: Duration,
    /// Hard cap on poll attempts, so a permanently stuck remote
    /// execution cannot be polled forever.
    pub max_polls: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

/// Polls a [`RemoteRunner`] until a terminal status, emitting status
/// transitions on a channel. A rate-limited signal is cleared as soon
/// as a subsequent poll reports running or terminal.
pub struct CompletionTracker {
    runner: Arc<dyn RemoteRunner>,
    config: TrackerConfig,
}

impl CompletionTracker {
    pub fn new(runner: Arc<dyn RemoteRunner>) -> Self {
        Self::with_config(runner, TrackerConfig::default())
    }

    pub fn with_config(runner: Arc<dyn RemoteRunner>, config: TrackerConfig) -> Self {
        CompletionTracker { runner, config }
    }

    /// Submit `request` and track it to completion.
    pub async fn submit_and_track(
        &self,
        request: &RunRequest,
        status_tx: mpsc::UnboundedSender<TrackerStatus>,
        cancel: CancellationToken,
    ) -> Result<TrackerStatus, SyncError> {
        let execution_id = self.runner.submit(request).await?;
        self.track(&execution_id, status_tx, cancel).await
    }

    /// Track an already-submitted execution. Returns the terminal
    /// status, or `SyncError::Cancelled` if the caller abandoned it.
    pub async fn track(
        &self,
        execution_id: &str,
        status_tx: mpsc::UnboundedSender<TrackerStatus>,
        cancel: CancellationToken,
    ) -> Result<TrackerStatus, SyncError> {
        let mut last_emitted: Option<TrackerStatus> = None;

        for _ in 0..self.config.max_polls {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                _ = tokio::time::sleep(self.config.interval) => {}
            }

            let poll = match self.runner.poll(execution_id).await {
                Ok(poll) => poll,
                Err(e) => {
                    // Transient poll failures burn an attempt but are
                    // otherwise invisible to the caller.
                    warn!(execution_id, error = %e, "poll failed");
                    continue;
                }
            };

            let status = match poll.status {
                RemoteRunStatus::Running => TrackerStatus::Running,
                RemoteRunStatus::RateLimited => TrackerStatus::RateLimited {
                    retry_after_secs: poll.retry_after_secs.unwrap_or(1),
                },
                RemoteRunStatus::Completed => TrackerStatus::Completed,
                RemoteRunStatus::Failed => TrackerStatus::Failed {
                    error: poll
                        .error
                        .unwrap_or_else(|| "remote execution failed".into()),
                },
            };

            if last_emitted.as_ref() != Some(&status) {
                let _ = status_tx.send(status.clone());
                last_emitted = Some(status.clone());
            }

            if status.is_terminal() {
                return Ok(status);
            }

            // Honor the service's backoff hint beyond the base interval.
            if let TrackerStatus::RateLimited { retry_after_secs } = &status {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_secs(*retry_after_secs)) => {}
                }
            }
        }

        let exhausted = TrackerStatus::Failed {
            error: "poll budget exhausted".into(),
        };
        let _ = status_tx.send(exhausted.clone());
        Ok(exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Scripted runner that replays a fixed sequence of polls.
    struct ScriptedRunner {
        script: Mutex<Vec<RemotePoll>>,
    }

    impl ScriptedRunner {
        fn new(mut script: Vec<RemotePoll>) -> Self {
            script.reverse();
            ScriptedRunner {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl RemoteRunner for ScriptedRunner {
        async fn submit(&self, _request: &RunRequest) -> Result<String, SyncError> {
            Ok("exec-1".into())
        }

        async fn poll(&self, _execution_id: &str) -> Result<RemotePoll, SyncError> {
            Ok(self.script.lock().pop().unwrap_or(RemotePoll {
                status: RemoteRunStatus::Completed,
                retry_after_secs: None,
                error: None,
            }))
        }
    }

    fn poll(status: RemoteRunStatus) -> RemotePoll {
        RemotePoll {
            status,
            retry_after_secs: None,
            error: None,
        }
    }

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            interval: Duration::from_millis(1),
            max_polls: 20,
        }
    }

    #[tokio::test]
    async fn rate_limit_is_surfaced_then_cleared() {
        let runner = Arc::new(ScriptedRunner::new(vec![
            poll(RemoteRunStatus::Running),
            RemotePoll {
                status: RemoteRunStatus::RateLimited,
                retry_after_secs: Some(0),
                error: None,
            },
            poll(RemoteRunStatus::Running),
            poll(RemoteRunStatus::Completed),
        ]));
        let tracker = CompletionTracker::with_config(runner, fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let terminal = tracker
            .track("exec-1", tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(terminal, TrackerStatus::Completed);

        let mut seen = Vec::new();
        while let Ok(status) = rx.try_recv() {
            seen.push(status);
        }
        assert_eq!(
            seen,
            vec![
                TrackerStatus::Running,
                TrackerStatus::RateLimited {
                    retry_after_secs: 0
                },
                TrackerStatus::Running,
                TrackerStatus::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn poll_budget_is_bounded() {
        let script: Vec<RemotePoll> = (0..100).map(|_| poll(RemoteRunStatus::Running)).collect();
        let runner = Arc::new(ScriptedRunner::new(script));
        let tracker = CompletionTracker::with_config(
            runner,
            TrackerConfig {
                interval: Duration::from_millis(1),
                max_polls: 5,
            },
        );
        let (tx, _rx) = mpsc::unbounded_channel();

        let terminal = tracker
            .track("exec-1", tx, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(terminal, TrackerStatus::Failed { ref error } if error.contains("budget")));
    }

    #[tokio::test]
    async fn cancellation_abandons_polling() {
        let script: Vec<RemotePoll> = (0..100).map(|_| poll(RemoteRunStatus::Running)).collect();
        let runner = Arc::new(ScriptedRunner::new(script));
        let tracker = CompletionTracker::with_config(runner, fast_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = tracker.track("exec-1", tx, cancel).await;
        assert!(matches!(outcome, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn failed_remote_status_carries_the_error() {
        let runner = Arc::new(ScriptedRunner::new(vec![RemotePoll {
            status: RemoteRunStatus::Failed,
            retry_after_secs: None,
            error: Some("provider quota".into()),
        }]));
        let tracker = CompletionTracker::with_config(runner, fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let terminal = tracker
            .track("exec-1", tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            terminal,
            TrackerStatus::Failed {
                error: "provider quota".into()
            }
        );
        assert_eq!(rx.try_recv().unwrap(), terminal);
    }
}
