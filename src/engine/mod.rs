//! Execution orchestration: the synchronous run loop, structured-output
//! flattening, run events, and the submit-then-poll completion tracker
//! that supersedes the loop for server-side executions.

pub mod events;
pub mod flatten;
pub mod orchestrator;
pub mod tracker;

pub use events::{event_channel, EventReceiver, EventSender, RunEvent};
pub use flatten::{flatten_structured, strip_code_fences, FlattenError};
pub use orchestrator::{Engine, RunOptions, RunReport, RunRequest};
pub use tracker::{
    CompletionTracker, RemotePoll, RemoteRunStatus, RemoteRunner, TrackerConfig, TrackerStatus,
};
