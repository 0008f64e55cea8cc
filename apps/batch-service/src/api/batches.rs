//! Batch ingestion, monitoring, and control.

use app_errors::AppError;
use axum::{extract::{Path, State}, response::{IntoResponse, Response}, Json};
use batch_domain::{prepare_new_batch, BatchStatus, CreateBatch, TaskStatus};
use serde::Serialize;
use uuid::Uuid;

use crate::state::AppState;

pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateBatch>,
) -> Result<Json<batch_domain::Batch>, AppError> {
    let new_batch = prepare_new_batch(request)?;
    let batch = state.batches.create(new_batch).await?;
    state
        .batches
        .set_status(batch.id, BatchStatus::Processing, None)
        .await?;

    if !state.worker_pool.is_running().await {
        state
            .worker_pool
            .start()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }

    let batch = state.batches.get(batch.id).await?;
    Ok(Json(batch))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<batch_domain::Batch>, AppError> {
    Ok(Json(state.batches.get(batch_id).await?))
}

pub async fn get_tasks(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<Vec<batch_domain::Task>>, AppError> {
    Ok(Json(state.tasks.list_by_batch(batch_id).await?))
}

#[derive(Serialize)]
pub struct ProgressResponse {
    #[serde(flatten)]
    pub progress: batch_domain::BatchProgress,
    pub worker_pool: worker_pool::PoolStatus,
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = state.batches.progress(batch_id).await?;
    let worker_pool = state.worker_pool.status().await;
    Ok(Json(ProgressResponse { progress, worker_pool }))
}

pub async fn stop_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .batches
        .set_status(batch_id, BatchStatus::Stopped, None)
        .await?;
    Ok(Json(state.batches.get(batch_id).await?))
}

/// Resets every `failed|queued|running` task of the batch back to `pending`
/// and clears their error fields.
pub async fn retry_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<batch_domain::Batch>, AppError> {
    reset_and_resume(&state, batch_id, &[TaskStatus::Failed, TaskStatus::Queued, TaskStatus::Running]).await
}

/// Same reset scope as [`retry_batch`] (`failed|queued|running` -> `pending`).
pub async fn retry_failed_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<batch_domain::Batch>, AppError> {
    reset_and_resume(&state, batch_id, &[TaskStatus::Failed, TaskStatus::Queued, TaskStatus::Running]).await
}

async fn reset_and_resume(
    state: &AppState,
    batch_id: Uuid,
    from: &[TaskStatus],
) -> Result<Json<batch_domain::Batch>, AppError> {
    let reverted = state.tasks.revert_statuses_to_pending(batch_id, from).await?;

    let counts = state.tasks.status_counts(batch_id).await?;
    let completed = *counts.get(&TaskStatus::Completed).unwrap_or(&0);
    state.batches.set_processed_rows(batch_id, completed as i32).await?;

    if reverted > 0 {
        state
            .batches
            .set_status(batch_id, BatchStatus::Processing, None)
            .await?;
    }

    Ok(Json(state.batches.get(batch_id).await?))
}

/// Valid only on a `stopped` batch: moves `pending|cancelled` tasks back to
/// `pending` and flips the batch to `processing`, or straight to
/// `completed` if every task was already done.
pub async fn resume_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<batch_domain::Batch>, AppError> {
    let batch = state.batches.get(batch_id).await?;
    if batch.status != BatchStatus::Stopped {
        return Err(AppError::Conflict(format!(
            "batch {batch_id} is not stopped, cannot resume"
        )));
    }

    state
        .tasks
        .revert_statuses_to_pending(batch_id, &[TaskStatus::Pending, TaskStatus::Cancelled])
        .await?;

    let counts = state.tasks.status_counts(batch_id).await?;
    let completed = *counts.get(&TaskStatus::Completed).unwrap_or(&0);

    let next_status = if completed == batch.total_rows as i64 {
        BatchStatus::Completed
    } else {
        BatchStatus::Processing
    };
    state.batches.set_status(batch_id, next_status, None).await?;

    if next_status == BatchStatus::Processing && !state.worker_pool.is_running().await {
        state
            .worker_pool
            .start()
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }

    Ok(Json(state.batches.get(batch_id).await?))
}

pub async fn download_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let batch = state.batches.get(batch_id).await?;
    let tasks = state.tasks.list_by_batch(batch_id).await?;
    let csv = batch_domain::csv::render_csv(&batch, &tasks);

    Ok((
        [
            ("Content-Type", "text/csv; charset=utf-8".to_string()),
            ("Content-Disposition", batch_domain::csv::content_disposition(&batch.file_name)),
        ],
        csv,
    )
        .into_response())
}

pub async fn reset_batch_errors(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state
        .worker_pool
        .reset_batch_error_count(batch_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct ResetUserErrorsResponse {
    pub reset_count: u64,
}

pub async fn reset_user_errors(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ResetUserErrorsResponse>, AppError> {
    let reset_count = state
        .worker_pool
        .reset_user_error_count(user_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(ResetUserErrorsResponse { reset_count }))
}
