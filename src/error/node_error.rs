use thiserror::Error;

/// Errors raised by a single node's underlying capability.
///
/// These never propagate past the dispatcher: they are captured into
/// [`ExecutionResult::error`](crate::context::ExecutionResult) and the
/// orchestrator decides whether to halt from there.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Sandbox error: {0}")]
    Sandbox(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Request timeout after {0}ms")]
    Timeout(u64),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for NodeError {
    fn from(e: serde_json::Error) -> Self {
        NodeError::Serialization(e.to_string())
    }
}
