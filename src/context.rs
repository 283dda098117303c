//! Mutable state threaded through one execution pass: the variable
//! table and the ordered result map.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The durable outcome of executing one node. Exactly one per executed
/// node; wire field names stay camelCase for stored-data compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub node_id: String,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResultMetadata>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    /// Wall-clock duration of the dispatch, in milliseconds.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_data: Option<Value>,
}

/// Result map keyed by node id, preserving insertion order.
/// Insertion order equals completion order by construction.
#[derive(Debug, Default, Clone)]
pub struct ResultMap {
    order: Vec<String>,
    entries: HashMap<String, ExecutionResult>,
}

impl ResultMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: ExecutionResult) {
        if !self.entries.contains_key(&result.node_id) {
            self.order.push(result.node_id.clone());
        }
        self.entries.insert(result.node_id.clone(), result);
    }

    pub fn get(&self, node_id: &str) -> Option<&ExecutionResult> {
        self.entries.get(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.entries.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Results in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn to_vec(&self) -> Vec<ExecutionResult> {
        self.iter().cloned().collect()
    }
}

/// Mutable variable/result state owned by exactly one in-flight run.
/// Created fresh per invocation; the result map is the durable artifact.
#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    pub variables: HashMap<String, String>,
    pub results: ResultMap,
}

impl ExecutionContext {
    pub fn new(variables: HashMap<String, String>) -> Self {
        ExecutionContext {
            variables,
            results: ResultMap::new(),
        }
    }
}
