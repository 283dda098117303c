//! Error types for the flow engine.
//!
//! - [`NodeError`]: errors raised during individual node execution.
//! - [`FlowError`]: top-level errors for graph building and running.
//! - [`StoreError`] / [`SyncError`]: persistence and remote-sync errors.

pub mod flow_error;
pub mod node_error;
pub mod store_error;

pub use flow_error::FlowError;
pub use node_error::NodeError;
pub use store_error::{StoreError, SyncError};

/// Convenience alias for flow-level results.
pub type FlowResult<T> = Result<T, FlowError>;
/// Convenience alias for node-level results.
pub type NodeResult<T> = Result<T, NodeError>;
