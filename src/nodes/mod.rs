//! Node dispatch: one executor per [`NodeType`] variant, resolved
//! through a closed registry. Capability failures are wrapped into the
//! node's [`ExecutionResult`] here; they never propagate further.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::context::{ExecutionContext, ExecutionResult, ResultMetadata};
use crate::error::NodeError;
use crate::graph::{FlowGraph, Node, NodeType};
use crate::llm::ProviderRegistry;
use crate::sandbox::CodeSandbox;

pub mod code;
pub mod llm;
pub mod notes;
pub mod webhook;

pub use code::CodeNodeExecutor;
pub use llm::LlmNodeExecutor;
pub use notes::NotesNodeExecutor;
pub use webhook::{WebhookInExecutor, WebhookOutExecutor};

/// What a node executor hands back on success.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u64>,
    pub structured_data: Option<Value>,
    pub trace_id: Option<String>,
}

impl NodeOutput {
    pub fn text(text: impl Into<String>) -> Self {
        NodeOutput {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Trait for node execution. Each node type implements this.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &Node,
        context: &ExecutionContext,
        graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError>;
}

/// Registry mapping every [`NodeType`] variant to its executor.
///
/// The constructor registers a handler for the whole closed set, so
/// dispatch cannot encounter an unhandled type at runtime.
pub struct NodeRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl NodeRegistry {
    pub fn new(providers: Arc<ProviderRegistry>, sandbox: Arc<dyn CodeSandbox>) -> Self {
        let mut registry = NodeRegistry {
            executors: HashMap::new(),
        };
        let llm = Arc::new(LlmNodeExecutor::new(providers));
        registry.register(NodeType::LlmProvider, llm.clone());
        // Tool agents are provider calls with enabledTools populated.
        registry.register(NodeType::ToolAgent, llm);
        registry.register(NodeType::Code, Arc::new(CodeNodeExecutor::new(sandbox)));
        registry.register(NodeType::WebhookOut, Arc::new(WebhookOutExecutor::new()));
        registry.register(NodeType::WebhookIn, Arc::new(WebhookInExecutor));
        registry.register(NodeType::Notes, Arc::new(NotesNodeExecutor));
        registry.register(NodeType::Other, Arc::new(OtherNodeExecutor));
        registry
    }

    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type).cloned()
    }

    /// Execute `node` and fold the outcome (success or capability
    /// failure) into an [`ExecutionResult`].
    pub async fn dispatch(
        &self,
        node: &Node,
        context: &ExecutionContext,
        graph: &FlowGraph,
    ) -> ExecutionResult {
        let started = Instant::now();
        let outcome = match self.get(node.node_type) {
            Some(executor) => executor.execute(node, context, graph).await,
            None => Err(NodeError::Config(format!(
                "no executor registered for node type {:?}",
                node.node_type
            ))),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => ExecutionResult {
                node_id: node.id.clone(),
                output: output.text,
                error: None,
                executed_at: Utc::now(),
                trace_id: output.trace_id,
                metadata: Some(ResultMetadata {
                    model: output.model,
                    tokens_used: output.tokens_used,
                    duration_ms,
                    structured_data: output.structured_data,
                }),
            },
            Err(err) => {
                tracing::warn!(node_id = %node.id, error = %err, "node execution failed");
                ExecutionResult {
                    node_id: node.id.clone(),
                    output: String::new(),
                    error: Some(err.to_string()),
                    executed_at: Utc::now(),
                    trace_id: None,
                    metadata: Some(ResultMetadata {
                        model: None,
                        tokens_used: None,
                        duration_ms,
                        structured_data: None,
                    }),
                }
            }
        }
    }
}

/// Unknown palette nodes execute as an empty passthrough, so imported
/// flows with unrecognized node kinds still run.
struct OtherNodeExecutor;

#[async_trait]
impl NodeExecutor for OtherNodeExecutor {
    async fn execute(
        &self,
        node: &Node,
        _context: &ExecutionContext,
        _graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        tracing::debug!(node_id = %node.id, "skipping node of unknown type");
        Ok(NodeOutput::text(""))
    }
}
