use async_trait::async_trait;
use credential_store::ResolvedCredentials;

/// External collaborator: provider/model enablement and credential lookup.
/// Backed by the persistence adapter in the full application; mocked in
/// tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    async fn is_provider_enabled(&self, provider: &str) -> bool;

    async fn is_model_enabled(&self, provider: &str, model: &str) -> bool;

    async fn credentials(&self, provider: &str) -> Result<ResolvedCredentials, ProxyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("proxy path must not be empty")]
    EmptyPath,

    #[error("no provider could be resolved: set X-Gaia-Provider, ?provider=, or a body `model` field")]
    ProviderUnresolved,

    #[error("provider {0} is not enabled")]
    ProviderDisabled(String),

    #[error("model {model} is not enabled for provider {provider}")]
    ModelDisabled { provider: String, model: String },

    #[error("provider {0} has no available upstream endpoint")]
    NoEndpoint(String),

    #[error("credential lookup failed: {0}")]
    Credentials(String),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}
