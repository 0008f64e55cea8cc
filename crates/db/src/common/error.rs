/// Unified error type for connection-level database failures. Query-level
/// errors are handled by each domain repository and surfaced as
/// `app_errors::AppError` at the service boundary.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sea_orm::DbErr),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("migration error: {0}")]
    MigrationError(String),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;
