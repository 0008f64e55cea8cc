use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::collections::HashMap;
use uuid::Uuid;

use crate::entity::{batch, task};
use crate::error::{BatchError, BatchResult};
use crate::models::{Batch, BatchProgress, BatchStatus, Task, TaskStatus};
use crate::repository::{BatchRepository, NewBatch, TaskRepository};

pub struct PgBatchRepository {
    db: DatabaseConnection,
}

impl PgBatchRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BatchRepository for PgBatchRepository {
    async fn create(&self, new_batch: NewBatch) -> BatchResult<Batch> {
        let txn = self.db.begin().await?;

        let now = Utc::now();
        let batch_id = Uuid::now_v7();
        let total_rows = new_batch.row_inputs.len() as i32;

        let active = batch::ActiveModel {
            id: Set(batch_id),
            user_id: Set(new_batch.user_id),
            installed_app_id: Set(new_batch.installed_app_id),
            file_name: Set(new_batch.file_name),
            total_rows: Set(total_rows),
            processed_rows: Set(0),
            status: Set(BatchStatus::Pending),
            key_mapping: Set(serde_json::to_value(&new_batch.key_mapping).unwrap_or_default()),
            last_error: Set(None),
            error_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        active.insert(&txn).await?;

        for (row_index, inputs) in new_batch.row_inputs.into_iter().enumerate() {
            let task_active = task::ActiveModel {
                id: Set(Uuid::now_v7()),
                batch_id: Set(batch_id),
                row_index: Set(row_index as i32),
                inputs: Set(serde_json::to_value(&inputs).unwrap_or_default()),
                status: Set(TaskStatus::Pending),
                result: Set(None),
                error: Set(None),
                error_count: Set(0),
                created_at: Set(now),
                updated_at: Set(now),
            };
            task_active.insert(&txn).await?;
        }

        txn.commit().await?;
        self.get(batch_id).await
    }

    async fn get(&self, id: Uuid) -> BatchResult<Batch> {
        batch::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Batch::from)
            .ok_or(BatchError::BatchNotFound(id))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: BatchStatus,
        last_error: Option<String>,
    ) -> BatchResult<()> {
        let model = batch::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::BatchNotFound(id))?;
        let mut active: batch::ActiveModel = model.into();
        active.status = Set(status);
        active.last_error = Set(last_error);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn set_processed_rows(&self, id: Uuid, processed_rows: i32) -> BatchResult<()> {
        let model = batch::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::BatchNotFound(id))?;
        let mut active: batch::ActiveModel = model.into();
        active.processed_rows = Set(processed_rows);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn reset_error_count(&self, id: Uuid) -> BatchResult<()> {
        let model = batch::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::BatchNotFound(id))?;
        let mut active: batch::ActiveModel = model.into();
        active.error_count = Set(0);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn record_error(&self, id: Uuid, last_error: String) -> BatchResult<()> {
        let model = batch::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::BatchNotFound(id))?;
        let new_error_count = model.error_count + 1;
        let mut active: batch::ActiveModel = model.into();
        active.error_count = Set(new_error_count);
        active.last_error = Set(Some(last_error));
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn reset_error_count_for_user(&self, user_id: Uuid) -> BatchResult<u64> {
        let result = batch::Entity::update_many()
            .col_expr(batch::Column::ErrorCount, Expr::value(0))
            .col_expr(batch::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(batch::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn progress(&self, id: Uuid) -> BatchResult<BatchProgress> {
        let b = self.get(id).await?;

        let counts = task::Entity::find()
            .filter(task::Column::BatchId.eq(id))
            .select_only()
            .column(task::Column::Status)
            .column_as(task::Column::Id.count(), "count")
            .group_by(task::Column::Status)
            .into_tuple::<(TaskStatus, i64)>()
            .all(&self.db)
            .await?;

        let mut by_status: HashMap<TaskStatus, i64> = HashMap::new();
        for (status, count) in counts {
            by_status.insert(status, count);
        }

        let completed = *by_status.get(&TaskStatus::Completed).unwrap_or(&0);

        Ok(BatchProgress {
            batch_id: id,
            status: b.status,
            total_rows: b.total_rows,
            pending: *by_status.get(&TaskStatus::Pending).unwrap_or(&0),
            queued: *by_status.get(&TaskStatus::Queued).unwrap_or(&0),
            running: *by_status.get(&TaskStatus::Running).unwrap_or(&0),
            completed,
            failed: *by_status.get(&TaskStatus::Failed).unwrap_or(&0),
            cancelled: *by_status.get(&TaskStatus::Cancelled).unwrap_or(&0),
            percent: BatchProgress::percent_complete(completed, b.total_rows),
            last_error: b.last_error,
        })
    }

    async fn active_user_error_counts(&self) -> BatchResult<HashMap<Uuid, i64>> {
        let rows = batch::Entity::find()
            .filter(
                batch::Column::Status
                    .eq(BatchStatus::Pending)
                    .or(batch::Column::Status.eq(BatchStatus::Processing)),
            )
            .select_only()
            .column(batch::Column::UserId)
            .column_as(batch::Column::ErrorCount.sum(), "error_count")
            .group_by(batch::Column::UserId)
            .into_tuple::<(Uuid, i64)>()
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().collect())
    }

    async fn cascade_insufficient_balance(
        &self,
        user_id: Uuid,
        current_batch_id: Uuid,
        message: String,
    ) -> BatchResult<Vec<Uuid>> {
        let txn = self.db.begin().await?;
        let now = Utc::now();

        batch::Entity::update_many()
            .col_expr(batch::Column::Status, Expr::value(BatchStatus::Failed))
            .col_expr(batch::Column::LastError, Expr::value(message.clone()))
            .col_expr(batch::Column::UpdatedAt, Expr::value(now))
            .filter(batch::Column::Id.eq(current_batch_id))
            .filter(
                batch::Column::Status
                    .eq(BatchStatus::Pending)
                    .or(batch::Column::Status.eq(BatchStatus::Processing)),
            )
            .exec(&txn)
            .await?;

        let other_batches = batch::Entity::find()
            .filter(batch::Column::UserId.eq(user_id))
            .filter(batch::Column::Id.ne(current_batch_id))
            .filter(batch::Column::Status.eq(BatchStatus::Pending))
            .all(&txn)
            .await?;
        let other_ids: Vec<Uuid> = other_batches.iter().map(|b| b.id).collect();

        if !other_ids.is_empty() {
            batch::Entity::update_many()
                .col_expr(batch::Column::Status, Expr::value(BatchStatus::Failed))
                .col_expr(batch::Column::LastError, Expr::value(message))
                .col_expr(batch::Column::UpdatedAt, Expr::value(now))
                .filter(batch::Column::Id.is_in(other_ids.clone()))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(other_ids)
    }

    async fn ids_with_status(&self, status: BatchStatus) -> BatchResult<Vec<Uuid>> {
        let rows = batch::Entity::find()
            .filter(batch::Column::Status.eq(status))
            .select_only()
            .column(batch::Column::Id)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    async fn reset_stalled_processing_batches(&self) -> BatchResult<u64> {
        let processing = batch::Entity::find()
            .filter(batch::Column::Status.eq(BatchStatus::Processing))
            .select_only()
            .column(batch::Column::Id)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;
        if processing.is_empty() {
            return Ok(0);
        }

        let live = task::Entity::find()
            .filter(task::Column::BatchId.is_in(processing.clone()))
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Running)
                    .or(task::Column::Status.eq(TaskStatus::Queued)),
            )
            .select_only()
            .column(task::Column::BatchId)
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;
        let live: std::collections::HashSet<Uuid> = live.into_iter().collect();
        let stalled: Vec<Uuid> = processing.into_iter().filter(|id| !live.contains(id)).collect();
        if stalled.is_empty() {
            return Ok(0);
        }

        let result = batch::Entity::update_many()
            .col_expr(batch::Column::Status, Expr::value(BatchStatus::Pending))
            .col_expr(batch::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(batch::Column::Id.is_in(stalled))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

pub struct PgTaskRepository {
    db: DatabaseConnection,
}

impl PgTaskRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn set_status_fields(
        &self,
        id: Uuid,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> BatchResult<()> {
        let model = task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::TaskNotFound(id))?;
        let mut active: task::ActiveModel = model.into();
        active.status = Set(status);
        if result.is_some() {
            active.result = Set(result);
        }
        active.error = Set(error);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn get(&self, id: Uuid) -> BatchResult<Task> {
        task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Task::from)
            .ok_or(BatchError::TaskNotFound(id))
    }

    async fn list_by_batch(&self, batch_id: Uuid) -> BatchResult<Vec<Task>> {
        let models = task::Entity::find()
            .filter(task::Column::BatchId.eq(batch_id))
            .order_by_asc(task::Column::RowIndex)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Task::from).collect())
    }

    async fn runnable_tasks_by_user(
        &self,
        max_retry_count: i32,
    ) -> BatchResult<HashMap<Uuid, Vec<Task>>> {
        let rows = task::Entity::find()
            .find_also_related(batch::Entity)
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Pending)
                    .or(task::Column::Status.eq(TaskStatus::Queued)),
            )
            .filter(task::Column::ErrorCount.lt(max_retry_count))
            .filter(
                batch::Column::Status
                    .eq(BatchStatus::Pending)
                    .or(batch::Column::Status.eq(BatchStatus::Processing)),
            )
            .order_by_asc(task::Column::CreatedAt)
            .order_by_asc(task::Column::RowIndex)
            .all(&self.db)
            .await?;

        let mut by_user: HashMap<Uuid, Vec<Task>> = HashMap::new();
        for (task_model, batch_model) in rows {
            if let Some(b) = batch_model {
                by_user
                    .entry(b.user_id)
                    .or_default()
                    .push(Task::from(task_model));
            }
        }
        Ok(by_user)
    }

    async fn claim_pending(&self, task_ids: &[Uuid]) -> BatchResult<Vec<Uuid>> {
        let mut claimed = Vec::with_capacity(task_ids.len());
        for &id in task_ids {
            let result = task::Entity::update_many()
                .col_expr(task::Column::Status, Expr::value(TaskStatus::Queued))
                .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(task::Column::Id.eq(id))
                .filter(task::Column::Status.eq(TaskStatus::Pending))
                .exec(&self.db)
                .await?;
            if result.rows_affected == 1 {
                claimed.push(id);
            }
        }
        Ok(claimed)
    }

    async fn revert_to_pending(&self, id: Uuid) -> BatchResult<()> {
        self.set_status_fields(id, TaskStatus::Pending, None, None)
            .await
    }

    async fn mark_running(&self, id: Uuid) -> BatchResult<()> {
        let model = task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::TaskNotFound(id))?;
        let mut active: task::ActiveModel = model.into();
        active.status = Set(TaskStatus::Running);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn mark_completed(&self, id: Uuid, result: serde_json::Value) -> BatchResult<()> {
        self.set_status_fields(id, TaskStatus::Completed, Some(result), None)
            .await
    }

    async fn mark_failed(&self, id: Uuid, error: String) -> BatchResult<()> {
        self.set_status_fields(id, TaskStatus::Failed, None, Some(error))
            .await
    }

    async fn record_retry_or_fail(
        &self,
        id: Uuid,
        error: String,
        max_retry_count: i32,
    ) -> BatchResult<TaskStatus> {
        let model = task::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(BatchError::TaskNotFound(id))?;
        let new_error_count = model.error_count + 1;
        let new_status = if new_error_count >= max_retry_count {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        };

        let mut active: task::ActiveModel = model.into();
        active.error_count = Set(new_error_count);
        active.error = Set(Some(error));
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        active.update(&self.db).await?;

        Ok(new_status)
    }

    async fn cancel_pending_queued_for_batch(&self, batch_id: Uuid) -> BatchResult<u64> {
        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Cancelled))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::BatchId.eq(batch_id))
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Pending)
                    .or(task::Column::Status.eq(TaskStatus::Queued)),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn cancel_pending_queued_for_batches(&self, batch_ids: &[Uuid]) -> BatchResult<u64> {
        if batch_ids.is_empty() {
            return Ok(0);
        }
        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Cancelled))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::BatchId.is_in(batch_ids.to_vec()))
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Pending)
                    .or(task::Column::Status.eq(TaskStatus::Queued)),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn revert_statuses_to_pending(
        &self,
        batch_id: Uuid,
        from: &[TaskStatus],
    ) -> BatchResult<u64> {
        let mut condition = sea_orm::Condition::any();
        for status in from {
            condition = condition.add(task::Column::Status.eq(*status));
        }

        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Pending))
            .col_expr(task::Column::Error, Expr::value::<Option<String>>(None))
            .col_expr(task::Column::ErrorCount, Expr::value(0))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::BatchId.eq(batch_id))
            .filter(condition)
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn status_counts(&self, batch_id: Uuid) -> BatchResult<HashMap<TaskStatus, i64>> {
        let counts = task::Entity::find()
            .filter(task::Column::BatchId.eq(batch_id))
            .select_only()
            .column(task::Column::Status)
            .column_as(task::Column::Id.count(), "count")
            .group_by(task::Column::Status)
            .into_tuple::<(TaskStatus, i64)>()
            .all(&self.db)
            .await?;
        Ok(counts.into_iter().collect())
    }

    async fn cold_start_reset(&self) -> BatchResult<u64> {
        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Pending))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Running)
                    .or(task::Column::Status.eq(TaskStatus::Queued)),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn fail_all_runnable_for_batch(&self, batch_id: Uuid, message: String) -> BatchResult<u64> {
        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Failed))
            .col_expr(task::Column::Error, Expr::value(message))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::BatchId.eq(batch_id))
            .filter(
                task::Column::Status
                    .eq(TaskStatus::Pending)
                    .or(task::Column::Status.eq(TaskStatus::Queued))
                    .or(task::Column::Status.eq(TaskStatus::Running)),
            )
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn fail_pending_for_batches(&self, batch_ids: &[Uuid], message: String) -> BatchResult<u64> {
        if batch_ids.is_empty() {
            return Ok(0);
        }
        let result = task::Entity::update_many()
            .col_expr(task::Column::Status, Expr::value(TaskStatus::Failed))
            .col_expr(task::Column::Error, Expr::value(message))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::BatchId.is_in(batch_ids.to_vec()))
            .filter(task::Column::Status.eq(TaskStatus::Pending))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_zero_total_is_zero() {
        assert_eq!(BatchProgress::percent_complete(0, 0), 0.0);
    }

    #[test]
    fn percent_complete_half() {
        assert_eq!(BatchProgress::percent_complete(1, 2), 50.0);
    }
}
