//! # Flowrun: a flow execution engine for visual workflow graphs
//!
//! `flowrun` executes node/edge graphs built in a visual editor. It
//! covers the full lifecycle of a flow:
//!
//! - **Scheduling**: deterministic topological execution order over the
//!   node graph, with cycle detection before any side effects.
//! - **Interpolation**: `{{token}}` substitution pulling from run
//!   variables and upstream node outputs.
//! - **Node execution**: LLM provider calls, tool-enabled agents,
//!   sandboxed code, inbound/outbound webhooks, and notes, dispatched
//!   through a pluggable executor registry.
//! - **Structured output**: JSON and CSV outputs flattened into
//!   addressable `{{node.field}}` tokens for downstream nodes.
//! - **Completion tracking**: polling of remotely-submitted runs with
//!   rate-limit backoff and a bounded poll budget.
//! - **Persistence and sync**: a session cache, a local SQLite store,
//!   and a remote service, reconciled on load and kept in step by a
//!   retrying sync queue plus a debounced autosave.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowrun::engine::{Engine, RunRequest};
//! use flowrun::llm::ProviderRegistry;
//! use flowrun::nodes::NodeRegistry;
//!
//! # fn sandbox() -> Arc<dyn flowrun::sandbox::CodeSandbox> { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     let providers = Arc::new(ProviderRegistry::new());
//!     let registry = Arc::new(NodeRegistry::new(providers, sandbox()));
//!     let engine = Engine::new(registry);
//!
//!     let json = std::fs::read_to_string("flow.json").unwrap();
//!     let request: RunRequest = serde_json::from_str(&json).unwrap();
//!     let report = engine.run(request, Default::default()).await.unwrap();
//!     println!("{:?}", report.status);
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod llm;
pub mod nodes;
pub mod sandbox;
pub mod store;
pub mod sync;
pub mod template;

pub use crate::context::{ExecutionContext, ExecutionResult, ResultMap, ResultMetadata};
pub use crate::engine::{
    CompletionTracker, Engine, RunEvent, RunOptions, RunReport, RunRequest, TrackerStatus,
};
pub use crate::error::{FlowError, FlowResult, NodeError, NodeResult, StoreError, SyncError};
pub use crate::graph::{Edge, FlowGraph, Node, NodeType, OutputFormat};
pub use crate::llm::{LlmProvider, ProviderRegistry, ProviderRequest, ProviderResponse};
pub use crate::nodes::{NodeExecutor, NodeOutput, NodeRegistry};
pub use crate::sandbox::CodeSandbox;
pub use crate::store::{Execution, ExecutionStore, Flow, FlowStore, MemoryStore, SqliteStore};
pub use crate::sync::{Autosave, Reconciler, SyncQueue};
