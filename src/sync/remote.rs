use async_trait::async_trait;
use serde_json::Value;

use crate::error::SyncError;
use crate::store::{Execution, Flow};

/// Remote store capability the reconciler and sync queue talk to.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_flows(&self) -> Result<Vec<Flow>, SyncError>;

    /// Upsert a flow remotely. Returns the id the remote settled on,
    /// which may differ from the local id (first-write-wins remotes).
    async fn push_flow(&self, flow: &Flow) -> Result<String, SyncError>;

    /// Soft-delete remotely.
    async fn delete_flow(&self, id: &str) -> Result<(), SyncError>;

    async fn fetch_executions(&self, flow_id: &str) -> Result<Vec<Execution>, SyncError>;
}

/// HTTP implementation of [`RemoteStore`] against a JSON REST service.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpRemoteStore {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn check(status: reqwest::StatusCode, body: &str, subject: &str) -> Result<(), SyncError> {
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(subject.to_string()));
        }
        if status.is_client_error() {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message: body.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SyncError::Remote(format!(
                "HTTP {} from remote: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_flows(&self) -> Result<Vec<Flow>, SyncError> {
        let url = format!("{}/flows", self.base_url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Self::check(status, &body, "flows")?;
        serde_json::from_str(&body).map_err(|e| SyncError::Remote(e.to_string()))
    }

    async fn push_flow(&self, flow: &Flow) -> Result<String, SyncError> {
        let url = format!("{}/flows/{}", self.base_url, flow.id);
        let response = self.client.put(&url).json(flow).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Self::check(status, &body, &flow.id)?;
        // The remote answers with the record it kept; its id wins.
        let assigned = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(Value::as_str).map(str::to_string));
        Ok(assigned.unwrap_or_else(|| flow.id.clone()))
    }

    async fn delete_flow(&self, id: &str) -> Result<(), SyncError> {
        let url = format!("{}/flows/{}", self.base_url, id);
        let response = self.client.delete(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Self::check(status, &body, id)
    }

    async fn fetch_executions(&self, flow_id: &str) -> Result<Vec<Execution>, SyncError> {
        let url = format!("{}/flows/{}/executions", self.base_url, flow_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Self::check(status, &body, flow_id)?;
        serde_json::from_str(&body).map_err(|e| SyncError::Remote(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_rejection_from_not_found() {
        let not_found =
            HttpRemoteStore::check(reqwest::StatusCode::NOT_FOUND, "", "f1").unwrap_err();
        assert!(matches!(not_found, SyncError::NotFound(_)));

        let rejected =
            HttpRemoteStore::check(reqwest::StatusCode::CONFLICT, "stale", "f1").unwrap_err();
        assert!(matches!(rejected, SyncError::Rejected { status: 409, .. }));

        let server_err =
            HttpRemoteStore::check(reqwest::StatusCode::BAD_GATEWAY, "", "f1").unwrap_err();
        assert!(matches!(server_err, SyncError::Remote(_)));

        assert!(HttpRemoteStore::check(reqwest::StatusCode::OK, "", "f1").is_ok());
    }
}
