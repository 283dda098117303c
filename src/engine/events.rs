//! Run events for the UI layer, delivered over an unbounded channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Clone, Debug, Serialize)]
pub enum RunEvent {
    NodeStarted {
        node_id: String,
        timestamp: DateTime<Utc>,
    },
    NodeFinished {
        node_id: String,
        output: String,
        timestamp: DateTime<Utc>,
    },
    NodeFailed {
        node_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    FlowCompleted {
        execution_id: String,
        timestamp: DateTime<Utc>,
    },
    FlowFailed {
        execution_id: String,
        error: String,
        failed_node_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

pub type EventSender = mpsc::UnboundedSender<RunEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<RunEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
