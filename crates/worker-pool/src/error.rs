use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Batch(#[from] batch_domain::BatchError),
}
