use thiserror::Error;

/// Top-level errors for building and running a flow.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Cycle detected in graph")]
    CycleDetected,
    #[error("Node not found: {0}")]
    NodeNotFound(String),
    #[error("Execution cancelled")]
    Cancelled,
    #[error("Internal error: {0}")]
    Internal(String),
}
