//! Persisted document shapes. Field names are camelCase on the wire to
//! stay compatible with existing stored data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionResult;
use crate::graph::{Edge, Node};

/// Pin priority of a flow. A global pin is owned by the remote/shared
/// level and always wins over device-local state during merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinLevel {
    #[default]
    None,
    Global,
}

/// The graph document embedded in a flow: what the canvas edits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowContent {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub viewport: Value,
}

/// A persisted flow document. Created on first save, mutated on every
/// save (which bumps `updatedAt`), never hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub version: String,
    pub flow: FlowContent,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub avg_execution_time: f64,
    #[serde(default)]
    pub pin_level: PinLevel,
    /// Device-specific provenance; preserved from the local side during
    /// merges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on_device: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Flow {
    pub fn new(name: impl Into<String>) -> Self {
        Flow {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: "0.1.0".into(),
            flow: FlowContent::default(),
            tags: vec![],
            status: "draft".into(),
            execution_count: 0,
            success_rate: 0.0,
            avg_execution_time: 0.0,
            pin_level: PinLevel::None,
            created_on_device: None,
            updated_at: Utc::now(),
            deleted: false,
            deleted_at: None,
        }
    }

    /// Bump the conflict-resolution timestamp; called on every save.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Terminal and non-terminal states of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// A persisted execution record: created `running` when a run starts,
/// finalized exactly once to a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub flow_id: String,
    pub flow_version: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Total duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_node_id: Option<String>,
}

impl Execution {
    pub fn started(flow_id: impl Into<String>, flow_version: impl Into<String>) -> Self {
        Execution {
            id: Uuid::new_v4().to_string(),
            flow_id: flow_id.into(),
            flow_version: flow_version.into(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            results: vec![],
            error: None,
            failed_node_id: None,
        }
    }
}
