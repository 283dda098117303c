//! Provider-dispatch interface: the capability trait an external LLM
//! provider implements, and the registry the llm/tool-agent node
//! executors resolve providers from.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod types;

pub use types::{ProviderRequest, ProviderResponse, ProviderUsage};

/// Failure surfaced by a provider. Wrapped into the failing node's
/// result by the dispatcher, never thrown past it.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// External LLM provider capability.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier the node `data.provider` field selects by.
    fn id(&self) -> &str;

    async fn invoke(&self, request: ProviderRequest) -> Result<ProviderResponse, LlmError>;
}

/// Registry of providers keyed by id, injected into the node registry.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
