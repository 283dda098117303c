use thiserror::Error;

/// Errors from the local persistence tiers (cache and durable store).
///
/// Never fatal to an in-flight execution; the caller surfaces them as a
/// degraded-save indicator and carries on.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Errors from talking to the remote store or remote runner.
///
/// A rejected sync attempt is abandoned; local state stays authoritative.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote error: {0}")]
    Remote(String),
    #[error("Remote rejected request: status={status}, {message}")]
    Rejected { status: u16, message: String },
    #[error("Remote record not found: {0}")]
    NotFound(String),
    #[error("Cancelled")]
    Cancelled,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Remote(e.to_string())
    }
}
