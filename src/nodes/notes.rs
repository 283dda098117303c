use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::graph::{FlowGraph, Node};
use crate::template::substitute;

use super::{NodeExecutor, NodeOutput};

/// Executor for `notes` nodes. Two sub-modes selected by the node's
/// `varMode` flag:
///
/// - `"processing"` interpolates the node's content against inputs
///   gathered from incoming edges: numbered `{{1}}`, `{{2}}` in edge
///   declaration order, plus the raw node-id keys.
/// - passthrough (the default) forwards the single incoming edge's
///   output unchanged, or empty output when there is none.
///
/// Notes executors never return an error: a note with no incoming edge
/// renders empty, and missing inputs pass through verbatim.
pub struct NotesNodeExecutor;

#[async_trait]
impl NodeExecutor for NotesNodeExecutor {
    async fn execute(
        &self,
        node: &Node,
        context: &ExecutionContext,
        graph: &FlowGraph,
    ) -> Result<NodeOutput, NodeError> {
        let sources = graph.incoming_sources(&node.id);

        if node.data_str("varMode") == Some("processing") {
            let content = node.data_str("content").unwrap_or_default();
            let mut scoped = context.clone();
            for (index, source) in sources.iter().enumerate() {
                if let Some(result) = context.results.get(source) {
                    scoped
                        .variables
                        .insert((index + 1).to_string(), result.output.clone());
                }
            }
            return Ok(NodeOutput::text(substitute(content, &scoped)));
        }

        let forwarded = sources
            .first()
            .and_then(|source| context.results.get(source))
            .map(|result| result.output.clone())
            .unwrap_or_default();
        Ok(NodeOutput::text(forwarded))
    }
}
