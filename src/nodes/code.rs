use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::{FlowGraph, Node};
use crate::sandbox::CodeSandbox;

use super::{NodeExecutor, NodeOutput};

/// Executor for `code` nodes: hands the node's code text plus a context
/// object (current variables and prior outputs) to the sandbox
/// capability. Sandbox exceptions are captured as node errors.
pub struct CodeNodeExecutor {
    sandbox: Arc<dyn CodeSandbox>,
}

impl CodeNodeExecutor {
    pub fn new(sandbox: Arc<dyn CodeSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl NodeExecutor for CodeNodeExecutor {
    async fn execute(
        &self,
        node: &Node,
        context: &ExecutionContext,
        _graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        let code = node
            .data_str("code")
            .ok_or_else(|| NodeError::Config(format!("node {} is missing 'code'", node.id)))?;

        let outputs: serde_json::Map<String, serde_json::Value> = context
            .results
            .iter()
            .map(|r| (r.node_id.clone(), json!(r.output)))
            .collect();
        let sandbox_context = json!({
            "variables": context.variables,
            "outputs": outputs,
        });

        let result = self
            .sandbox
            .run(code, &sandbox_context)
            .await
            .map_err(|e| NodeError::Sandbox(e.to_string()))?;

        Ok(NodeOutput::text(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionResult;
    use crate::graph::NodeType;
    use crate::sandbox::SandboxError;
    use chrono::Utc;
    use serde_json::Value;

    /// Test sandbox that returns its context back, serialized.
    struct EchoSandbox;

    #[async_trait]
    impl CodeSandbox for EchoSandbox {
        async fn run(&self, _code: &str, context: &Value) -> Result<String, SandboxError> {
            Ok(context.to_string())
        }
    }

    #[tokio::test]
    async fn sandbox_receives_variables_and_prior_outputs() {
        let executor = CodeNodeExecutor::new(Arc::new(EchoSandbox));
        let mut node = Node::new("c1", NodeType::Code);
        node.data.insert("code".into(), json!("return 1"));

        let mut ctx = ExecutionContext::default();
        ctx.variables.insert("k".into(), "v".into());
        ctx.results.insert(ExecutionResult {
            node_id: "earlier".into(),
            output: "prior".into(),
            error: None,
            executed_at: Utc::now(),
            trace_id: None,
            metadata: None,
        });
        let graph = FlowGraph::build(vec![node.clone()], vec![]);

        let output = executor.execute(&node, &ctx, &graph).await.unwrap();
        let seen: Value = serde_json::from_str(&output.text).unwrap();
        assert_eq!(seen["variables"]["k"], "v");
        assert_eq!(seen["outputs"]["earlier"], "prior");
    }

    #[tokio::test]
    async fn missing_code_is_a_config_error() {
        let executor = CodeNodeExecutor::new(Arc::new(EchoSandbox));
        let node = Node::new("c1", NodeType::Code);
        let graph = FlowGraph::build(vec![node.clone()], vec![]);
        let err = executor
            .execute(&node, &ExecutionContext::default(), &graph)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
