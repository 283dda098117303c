//! Graph model and scheduling: node/edge types, dangling-edge pruning,
//! and deterministic topological ordering.

pub mod builder;
pub mod traversal;
pub mod types;

pub use builder::FlowGraph;
pub use types::{Edge, Node, NodeType, OutputFormat};
