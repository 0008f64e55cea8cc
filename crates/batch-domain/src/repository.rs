use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::BatchResult;
use crate::models::{Batch, BatchProgress, BatchStatus, Task, TaskStatus};

/// A batch row ready to be inserted, with its rows already expanded into
/// per-task input maps (empty rows already filtered out by the caller).
pub struct NewBatch {
    pub user_id: Uuid,
    pub installed_app_id: String,
    pub file_name: String,
    /// Ordered `[key, column-name]` pairs, in source-file header order.
    pub key_mapping: Vec<(String, String)>,
    pub row_inputs: Vec<HashMap<String, String>>,
}

#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait BatchRepository: Send + Sync {
    /// Persists the batch (status `pending`) and its tasks (status
    /// `pending`) in one transaction.
    async fn create(&self, batch: NewBatch) -> BatchResult<Batch>;

    async fn get(&self, id: Uuid) -> BatchResult<Batch>;

    async fn set_status(
        &self,
        id: Uuid,
        status: BatchStatus,
        last_error: Option<String>,
    ) -> BatchResult<()>;

    async fn set_processed_rows(&self, id: Uuid, processed_rows: i32) -> BatchResult<()>;

    async fn reset_error_count(&self, id: Uuid) -> BatchResult<()>;

    /// Increments `error_count` by one and records `last_error`. Called on
    /// every task failure attempt, independent of whether the task itself
    /// retries or terminally fails.
    async fn record_error(&self, id: Uuid, last_error: String) -> BatchResult<()>;

    async fn reset_error_count_for_user(&self, user_id: Uuid) -> BatchResult<u64>;

    async fn progress(&self, id: Uuid) -> BatchResult<BatchProgress>;

    /// Cumulative batch-level error counts for every user that owns at
    /// least one enabled (`pending`/`processing`) batch — the `E(u)` input
    /// to the fair-share allocator.
    async fn active_user_error_counts(&self) -> BatchResult<HashMap<Uuid, i64>>;

    /// Balance-exhaustion cascade, batch side: sets `current_batch_id` to
    /// `failed` if it is currently `pending`/`processing`, and every
    /// *other* `pending` batch of `user_id` to `failed`, all with
    /// `message`. Returns the ids of the other batches that were flipped —
    /// the caller still needs to fail their pending tasks.
    async fn cascade_insufficient_balance(
        &self,
        user_id: Uuid,
        current_batch_id: Uuid,
        message: String,
    ) -> BatchResult<Vec<Uuid>>;

    /// Ids of every batch currently in `status`, for maintenance sweeps
    /// that need to act across all of them.
    async fn ids_with_status(&self, status: BatchStatus) -> BatchResult<Vec<Uuid>>;

    /// Cold-start repair: any batch in `processing` with no `running`/
    /// `queued` task (an interrupted process left it stranded) reverts to
    /// `pending` so the scheduler picks its tasks back up.
    async fn reset_stalled_processing_batches(&self) -> BatchResult<u64>;
}

#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> BatchResult<Task>;

    async fn list_by_batch(&self, batch_id: Uuid) -> BatchResult<Vec<Task>>;

    /// Users with at least one runnable (`pending`/`queued`) task in a
    /// non-stopped batch with `error_count < max_retry_count`, together
    /// with their pending tasks ordered by `(created_at, row_index)`. This
    /// is the `U` set the fair-share allocator and the task scheduler both
    /// consume.
    async fn runnable_tasks_by_user(
        &self,
        max_retry_count: i32,
    ) -> BatchResult<HashMap<Uuid, Vec<Task>>>;

    /// Atomically transitions `pending` -> `queued` for exactly the given
    /// task ids scheduled this tick; returns the ids that actually won the
    /// CAS (a task already moved by a concurrent tick is silently skipped).
    async fn claim_pending(&self, task_ids: &[Uuid]) -> BatchResult<Vec<Uuid>>;

    /// Reverts a task that failed to enqueue (channel full) back to
    /// `pending` so the next scheduler tick re-picks it.
    async fn revert_to_pending(&self, id: Uuid) -> BatchResult<()>;

    async fn mark_running(&self, id: Uuid) -> BatchResult<()>;

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> BatchResult<()>;

    async fn mark_failed(&self, id: Uuid, error: String) -> BatchResult<()>;

    /// Increments `error_count`; reverts to `pending` if still under
    /// `max_retry_count`, otherwise marks terminally `failed`. Returns the
    /// resulting status.
    async fn record_retry_or_fail(
        &self,
        id: Uuid,
        error: String,
        max_retry_count: i32,
    ) -> BatchResult<TaskStatus>;

    /// Moves every `pending`/`queued` task of `batch_id` to `cancelled`.
    async fn cancel_pending_queued_for_batch(&self, batch_id: Uuid) -> BatchResult<u64>;

    /// Same as [`Self::cancel_pending_queued_for_batch`] but across every
    /// id in `batch_ids` in one statement — used by the pool's periodic
    /// sweep for stopped batches.
    async fn cancel_pending_queued_for_batches(&self, batch_ids: &[Uuid]) -> BatchResult<u64>;

    /// Moves every `cancelled` task of `batch_id` back to `pending`
    /// (used by `Resume`), and any `failed`/`queued`/`running` task back
    /// to `pending` (used by `Retry`/`RetryFailed`), per the provided
    /// status filter.
    async fn revert_statuses_to_pending(
        &self,
        batch_id: Uuid,
        from: &[TaskStatus],
    ) -> BatchResult<u64>;

    async fn status_counts(&self, batch_id: Uuid) -> BatchResult<HashMap<TaskStatus, i64>>;

    /// Cold-start consistency sweep: every `running`/`queued` task reverts
    /// to `pending`. Run once before the first scheduler tick.
    async fn cold_start_reset(&self) -> BatchResult<u64>;

    /// Balance-exhaustion cascade: marks every `pending`/`queued`/`running`
    /// task of `batch_id` as `failed` with `message`, in one transaction.
    async fn fail_all_runnable_for_batch(&self, batch_id: Uuid, message: String) -> BatchResult<u64>;

    /// Balance-exhaustion cascade, task side for the *other* batches a
    /// cascade reached: marks every `pending` task of any of `batch_ids`
    /// as `failed` with `message`.
    async fn fail_pending_for_batches(&self, batch_ids: &[Uuid], message: String) -> BatchResult<u64>;
}
