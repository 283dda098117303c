use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::{FlowGraph, Node};
use crate::template::substitute;

use super::{NodeExecutor, NodeOutput};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Executor for `webhook-out` nodes: interpolates URL, headers, and
/// body, then issues the HTTP call under a per-call deadline.
///
/// Hitting the deadline is reported as a distinct timeout error, not
/// conflated with network failure.
pub struct WebhookOutExecutor {
    client: reqwest::Client,
}

impl WebhookOutExecutor {
    pub fn new() -> Self {
        WebhookOutExecutor {
            client: reqwest::Client::builder()
                .pool_max_idle_per_host(10)
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebhookOutExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NodeExecutor for WebhookOutExecutor {
    async fn execute(
        &self,
        node: &Node,
        context: &ExecutionContext,
        _graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        let url_template = node
            .data_str("url")
            .ok_or_else(|| NodeError::Config(format!("node {} is missing 'url'", node.id)))?;
        let url = substitute(url_template, context);
        let method = parse_method(node.data_str("method").unwrap_or("POST"))?;
        let timeout_ms = node.data_u64("timeoutMs").unwrap_or(DEFAULT_TIMEOUT_MS);

        let mut request = self
            .client
            .request(method, &url)
            .timeout(Duration::from_millis(timeout_ms));

        if let Some(headers) = node.data.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(key, substitute(value, context));
                }
            }
        }

        if let Some(body_template) = node.data_str("body") {
            request = request.body(substitute(body_template, context));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NodeError::Timeout(timeout_ms)
            } else {
                NodeError::Http(format!("request to {url} failed: {e}"))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| NodeError::Http(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(NodeError::Http(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        Ok(NodeOutput::text(body))
    }
}

fn parse_method(method: &str) -> Result<Method, NodeError> {
    match method.to_ascii_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        "PATCH" => Ok(Method::PATCH),
        "HEAD" => Ok(Method::HEAD),
        other => Err(NodeError::Config(format!(
            "unsupported HTTP method: {other}"
        ))),
    }
}

/// Executor for `webhook-in` nodes. Inbound webhooks are satisfied
/// out-of-band; during normal graph execution this is a stub that
/// surfaces whatever payload was seeded into the variable table.
pub struct WebhookInExecutor;

#[async_trait]
impl NodeExecutor for WebhookInExecutor {
    async fn execute(
        &self,
        _node: &Node,
        context: &ExecutionContext,
        _graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        let payload = context
            .variables
            .get("webhook-payload")
            .cloned()
            .unwrap_or_default();
        Ok(NodeOutput::text(payload))
    }
}
