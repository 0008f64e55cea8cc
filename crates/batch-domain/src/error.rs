use app_errors::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("batch {0} not found")]
    BatchNotFound(Uuid),

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type BatchResult<T> = Result<T, BatchError>;

impl From<BatchError> for AppError {
    fn from(e: BatchError) -> Self {
        match e {
            BatchError::BatchNotFound(id) => AppError::NotFound(format!("batch {id}")),
            BatchError::TaskNotFound(id) => AppError::NotFound(format!("task {id}")),
            BatchError::Validation(msg) => AppError::Validation(msg),
            BatchError::StoreUnavailable(msg) => AppError::StoreUnavailable(msg),
            BatchError::Database(msg) => AppError::Internal(msg),
        }
    }
}

impl From<sea_orm::DbErr> for BatchError {
    fn from(e: sea_orm::DbErr) -> Self {
        BatchError::Database(e.to_string())
    }
}
