use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::{FlowGraph, Node};
use crate::llm::{ProviderRegistry, ProviderRequest};
use crate::template::substitute;

use super::{NodeExecutor, NodeOutput};

/// Executor for `llm-provider` and `tool-agent` nodes.
///
/// Interpolates the prompts against the current context and hands the
/// call to an external provider resolved from the registry.
pub struct LlmNodeExecutor {
    providers: Arc<ProviderRegistry>,
}

impl LlmNodeExecutor {
    pub fn new(providers: Arc<ProviderRegistry>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl NodeExecutor for LlmNodeExecutor {
    async fn execute(
        &self,
        node: &Node,
        context: &ExecutionContext,
        _graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        let provider_id = node
            .data_str("provider")
            .ok_or_else(|| NodeError::Config(format!("node {} is missing 'provider'", node.id)))?;
        let model = node
            .data_str("model")
            .ok_or_else(|| NodeError::Config(format!("node {} is missing 'model'", node.id)))?;
        let user_prompt = node
            .data_str("userPrompt")
            .or_else(|| node.data_str("prompt"))
            .unwrap_or_default();

        let request = ProviderRequest {
            provider: provider_id.to_string(),
            model: model.to_string(),
            system_prompt: node
                .data_str("systemPrompt")
                .map(|p| substitute(p, context)),
            user_prompt: substitute(user_prompt, context),
            temperature: node.data_f64("temperature"),
            max_tokens: node.data_u64("maxTokens"),
            enabled_tools: enabled_tools(node),
            output_format: node.output_format(),
        };

        let provider = self
            .providers
            .get(provider_id)
            .ok_or_else(|| NodeError::Provider(format!("unknown provider: {provider_id}")))?;

        let response = provider
            .invoke(request)
            .await
            .map_err(|e| NodeError::Provider(e.to_string()))?;

        Ok(NodeOutput {
            text: response.text,
            model: Some(model.to_string()),
            tokens_used: response.usage.map(|u| u.total_tokens),
            structured_data: response.structured_data,
            trace_id: response.trace_id,
        })
    }
}

fn enabled_tools(node: &Node) -> Vec<String> {
    node.data
        .get("enabledTools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeType, OutputFormat};
    use crate::llm::{LlmError, LlmProvider, ProviderResponse};
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingProvider {
        seen: Mutex<Vec<ProviderRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        fn id(&self) -> &str {
            "fake"
        }

        async fn invoke(&self, request: ProviderRequest) -> Result<ProviderResponse, LlmError> {
            self.seen.lock().push(request);
            Ok(ProviderResponse {
                text: "provider says hi".into(),
                usage: None,
                structured_data: None,
                trace_id: Some("trace-1".into()),
            })
        }
    }

    fn llm_node() -> Node {
        let mut node = Node::new("llm1", NodeType::LlmProvider);
        node.data.insert("provider".into(), json!("fake"));
        node.data.insert("model".into(), json!("test-model"));
        node.data
            .insert("userPrompt".into(), json!("Say {{greeting}}"));
        node.data
            .insert("enabledTools".into(), json!(["search", "calc"]));
        node
    }

    #[tokio::test]
    async fn prompts_are_interpolated_before_the_call() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(vec![]),
        });
        let mut registry = ProviderRegistry::new();
        registry.register(provider.clone());
        let executor = LlmNodeExecutor::new(Arc::new(registry));

        let node = llm_node();
        let mut ctx = ExecutionContext::default();
        ctx.variables.insert("greeting".into(), "hello".into());
        let graph = FlowGraph::build(vec![node.clone()], vec![]);

        let output = executor.execute(&node, &ctx, &graph).await.unwrap();
        assert_eq!(output.text, "provider says hi");
        assert_eq!(output.trace_id.as_deref(), Some("trace-1"));

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].user_prompt, "Say hello");
        assert_eq!(seen[0].enabled_tools, vec!["search", "calc"]);
        assert_eq!(seen[0].output_format, OutputFormat::Text);
    }

    #[tokio::test]
    async fn unknown_provider_is_a_provider_error() {
        let executor = LlmNodeExecutor::new(Arc::new(ProviderRegistry::new()));
        let node = llm_node();
        let graph = FlowGraph::build(vec![node.clone()], vec![]);
        let err = executor
            .execute(&node, &ExecutionContext::default(), &graph)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Provider(_)));
    }

    #[tokio::test]
    async fn missing_model_is_a_config_error() {
        let executor = LlmNodeExecutor::new(Arc::new(ProviderRegistry::new()));
        let mut node = Node::new("llm1", NodeType::LlmProvider);
        node.data.insert("provider".into(), json!("fake"));
        let graph = FlowGraph::build(vec![node.clone()], vec![]);
        let err = executor
            .execute(&node, &ExecutionContext::default(), &graph)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }
}
