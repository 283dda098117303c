//! Three-tier persistence: session cache, local durable store, remote
//! service. The [`Reconciler`] merges the tiers on load, the
//! [`SyncQueue`] pushes local changes to the remote with bounded
//! retries, and [`Autosave`] debounces editor changes into saves.

mod autosave;
mod queue;
mod reconciler;
mod remote;

pub use autosave::{Autosave, AutosaveState};
pub use queue::{SyncJob, SyncOutcome, SyncQueue, SyncQueueConfig, SyncQueueHandle};
pub use reconciler::Reconciler;
pub use remote::{HttpRemoteStore, RemoteStore};
