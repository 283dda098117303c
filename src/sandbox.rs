//! Code-execution sandbox capability.
//!
//! The engine only needs a call/result/error contract; isolation is the
//! host's concern (an external sandbox service in production).

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Sandbox error: {0}")]
pub struct SandboxError(pub String);

/// Runs user code against a context object containing the current
/// variables and prior node outputs. May fail; the failure is captured
/// into the node's result.
#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn run(&self, code: &str, context: &Value) -> Result<String, SandboxError>;
}
