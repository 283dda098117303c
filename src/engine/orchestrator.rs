use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::context::{ExecutionContext, ResultMap};
use crate::error::{FlowError, FlowResult};
use crate::graph::{Edge, FlowGraph, Node, NodeType, OutputFormat};
use crate::nodes::NodeRegistry;
use crate::store::{Execution, ExecutionStatus, ExecutionStore, ExecutionUpdate};

use super::events::{EventSender, RunEvent};
use super::flatten::flatten_structured;

/// The graph and input variables for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

/// Per-run options; everything has a workable default.
#[derive(Default)]
pub struct RunOptions {
    /// Flow identity for the persisted execution record.
    pub flow_id: Option<String>,
    pub flow_version: Option<String>,
    /// Caller-held cancellation. An abandoned run stops mutating state.
    pub cancel: CancellationToken,
}

/// What one run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Id of the persisted execution record, when tracking is wired.
    pub execution_id: Option<String>,
    pub status: ExecutionStatus,
    pub results: ResultMap,
    pub error: Option<String>,
    pub failed_node_id: Option<String>,
    pub duration_ms: u64,
}

/// Drives the scheduler + dispatcher loop over one graph.
///
/// Single-threaded cooperative: each node's dispatch is awaited before
/// the next starts, which keeps variable propagation and halt-on-error
/// deterministic. The first node error halts the whole run; even
/// nodes unrelated to the failure do not execute.
pub struct Engine {
    registry: Arc<NodeRegistry>,
    executions: Option<Arc<dyn ExecutionStore>>,
    events: Option<EventSender>,
}

impl Engine {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Engine {
            registry,
            executions: None,
            events: None,
        }
    }

    /// Wire best-effort execution-record tracking. Tracking failures
    /// are logged and never fail the run itself.
    pub fn with_execution_store(mut self, store: Arc<dyn ExecutionStore>) -> Self {
        self.executions = Some(store);
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Minimal contract: run a graph and return the result map.
    pub async fn run_graph(
        &self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        variables: HashMap<String, String>,
    ) -> FlowResult<ResultMap> {
        let report = self
            .run(
                RunRequest {
                    nodes,
                    edges,
                    variables,
                },
                RunOptions::default(),
            )
            .await?;
        Ok(report.results)
    }

    pub async fn run(&self, request: RunRequest, options: RunOptions) -> FlowResult<RunReport> {
        let started = Instant::now();
        let graph = FlowGraph::build(request.nodes, request.edges);
        // A cycle aborts the whole run before any side effect occurs.
        let order: Vec<String> = graph
            .execution_order()?
            .iter()
            .map(|n| n.id.clone())
            .collect();

        let execution_id = self.track_start(&options).await;
        let mut ctx = ExecutionContext::new(request.variables);
        let mut run_error: Option<(String, String)> = None;

        for node_id in order {
            if options.cancel.is_cancelled() {
                return self.finish_cancelled(&execution_id, &ctx, started).await;
            }
            let Some(node) = graph.node(&node_id) else {
                continue;
            };

            self.emit(RunEvent::NodeStarted {
                node_id: node.id.clone(),
                timestamp: Utc::now(),
            });

            let mut result = tokio::select! {
                _ = options.cancel.cancelled() => {
                    return self.finish_cancelled(&execution_id, &ctx, started).await;
                }
                result = self.registry.dispatch(node, &ctx, &graph) => result,
            };

            // The output is published even on error, so later nodes on
            // sibling branches could still reference it.
            ctx.variables
                .insert(node.output_variable().to_string(), result.output.clone());

            if result.error.is_none() {
                self.flatten_into(node, &mut result, &mut ctx.variables);
            }

            let failed = result.error.clone();
            match &failed {
                None => self.emit(RunEvent::NodeFinished {
                    node_id: node.id.clone(),
                    output: result.output.clone(),
                    timestamp: result.executed_at,
                }),
                Some(error) => self.emit(RunEvent::NodeFailed {
                    node_id: node.id.clone(),
                    error: error.clone(),
                    timestamp: result.executed_at,
                }),
            }
            ctx.results.insert(result);

            if let Some(error) = failed {
                // Conservative all-stop: nothing else runs, related or not.
                run_error = Some((node.id.clone(), error));
                break;
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        let report = match run_error {
            None => {
                self.track_finish(
                    &execution_id,
                    ExecutionStatus::Completed,
                    &ctx,
                    duration_ms,
                    None,
                    None,
                )
                .await;
                if let Some(id) = &execution_id {
                    self.emit(RunEvent::FlowCompleted {
                        execution_id: id.clone(),
                        timestamp: Utc::now(),
                    });
                }
                RunReport {
                    execution_id,
                    status: ExecutionStatus::Completed,
                    results: ctx.results,
                    error: None,
                    failed_node_id: None,
                    duration_ms,
                }
            }
            Some((failed_node_id, error)) => {
                self.track_finish(
                    &execution_id,
                    ExecutionStatus::Failed,
                    &ctx,
                    duration_ms,
                    Some(error.clone()),
                    Some(failed_node_id.clone()),
                )
                .await;
                if let Some(id) = &execution_id {
                    self.emit(RunEvent::FlowFailed {
                        execution_id: id.clone(),
                        error: error.clone(),
                        failed_node_id: Some(failed_node_id.clone()),
                        timestamp: Utc::now(),
                    });
                }
                RunReport {
                    execution_id,
                    status: ExecutionStatus::Failed,
                    results: ctx.results,
                    error: Some(error),
                    failed_node_id: Some(failed_node_id),
                    duration_ms,
                }
            }
        };
        Ok(report)
    }

    fn flatten_into(
        &self,
        node: &Node,
        result: &mut crate::context::ExecutionResult,
        variables: &mut HashMap<String, String>,
    ) {
        let format = node.output_format();
        if format == OutputFormat::Text || node.node_type == NodeType::Notes {
            return;
        }
        match flatten_structured(node.output_variable(), format, &result.output, variables) {
            Ok(parsed) => {
                if let Some(metadata) = result.metadata.as_mut() {
                    if metadata.structured_data.is_none() {
                        metadata.structured_data = Some(parsed);
                    }
                }
            }
            // Best effort: the raw text output remains usable.
            Err(e) => warn!(node_id = %node.id, error = %e, "structured output parse failed"),
        }
    }

    async fn track_start(&self, options: &RunOptions) -> Option<String> {
        let store = self.executions.as_ref()?;
        let execution = Execution::started(
            options.flow_id.clone().unwrap_or_default(),
            options.flow_version.clone().unwrap_or_else(|| "0.0.0".into()),
        );
        let id = execution.id.clone();
        if let Err(e) = store.create(execution).await {
            warn!(error = %e, "failed to create execution record");
        }
        Some(id)
    }

    async fn track_finish(
        &self,
        execution_id: &Option<String>,
        status: ExecutionStatus,
        ctx: &ExecutionContext,
        duration_ms: u64,
        error: Option<String>,
        failed_node_id: Option<String>,
    ) {
        let (Some(store), Some(id)) = (self.executions.as_ref(), execution_id) else {
            return;
        };
        let update = ExecutionUpdate {
            status,
            completed_at: Utc::now(),
            duration_ms,
            results: ctx.results.to_vec(),
            error,
            failed_node_id,
        };
        if let Err(e) = store.finalize(id, update).await {
            warn!(execution_id = %id, error = %e, "failed to finalize execution record");
        }
    }

    async fn finish_cancelled(
        &self,
        execution_id: &Option<String>,
        ctx: &ExecutionContext,
        started: Instant,
    ) -> FlowResult<RunReport> {
        debug!("run cancelled by caller");
        self.track_finish(
            execution_id,
            ExecutionStatus::Cancelled,
            ctx,
            started.elapsed().as_millis() as u64,
            None,
            None,
        )
        .await;
        Err(FlowError::Cancelled)
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
