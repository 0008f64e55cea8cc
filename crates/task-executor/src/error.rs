use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Batch(#[from] batch_domain::BatchError),

    #[error(transparent)]
    Upstream(#[from] upstream_client::UpstreamError),

    #[error("user {0} not found or disabled")]
    UserDisabled(uuid::Uuid),

    #[error("token minting failed: {0}")]
    TokenMint(String),

    #[error("installed app lookup failed: {0}")]
    AppLookup(String),
}
