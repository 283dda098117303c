use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of node kinds the dispatcher knows how to execute.
///
/// Unknown type tags from stored documents deserialize to [`NodeType::Other`]
/// so that importing a flow from a newer palette never fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    LlmProvider,
    ToolAgent,
    Code,
    WebhookIn,
    WebhookOut,
    Notes,
    #[serde(other)]
    Other,
}

/// A unit of work in the workflow graph.
///
/// `data` carries the node's free-form configuration: provider/model
/// selection, prompts, code text, webhook target, and the optional
/// `outputVariable` name. Nodes are immutable for the duration of one
/// execution pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Node {
            id: id.into(),
            node_type,
            data: Map::new(),
        }
    }

    /// String-valued config entry, if present and a string.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    pub fn data_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(Value::as_f64)
    }

    /// Name under which this node's output is published into the
    /// variable table. Defaults to the node id.
    pub fn output_variable(&self) -> &str {
        self.data_str("outputVariable").unwrap_or(&self.id)
    }

    /// Declared output format, used for structured-output flattening.
    pub fn output_format(&self) -> OutputFormat {
        match self.data_str("outputFormat") {
            Some("json") => OutputFormat::Json,
            Some("csv") => OutputFormat::Csv,
            _ => OutputFormat::Text,
        }
    }
}

/// A directed dependency: `target` must execute after `source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Edge {
            id: id.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Declared shape of a node's textual output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}
