use axum::routing::{any, get, post};
use axum::Router;

pub mod batches;
pub mod health;
pub mod proxy;

use crate::state::AppState;

/// Assembles every route this binary serves. `/proxy` is mounted
/// separately from `/batches` and `/users` since it forwards arbitrary
/// paths rather than a fixed set of operations.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/metrics", get(observability::metrics_handler))
        .route("/batches", post(batches::create_batch))
        .route("/batches/{id}", get(batches::get_batch))
        .route("/batches/{id}/tasks", get(batches::get_tasks))
        .route("/batches/{id}/progress", get(batches::get_progress))
        .route("/batches/{id}/stop", post(batches::stop_batch))
        .route("/batches/{id}/retry", post(batches::retry_batch))
        .route("/batches/{id}/retry-failed", post(batches::retry_failed_batch))
        .route("/batches/{id}/resume", post(batches::resume_batch))
        .route("/batches/{id}/download", get(batches::download_batch))
        .route("/batches/{id}/reset-errors", post(batches::reset_batch_errors))
        .route("/users/{id}/reset-errors", post(batches::reset_user_errors))
        .route("/proxy/{*path}", any(proxy::forward))
        .with_state(state)
}
