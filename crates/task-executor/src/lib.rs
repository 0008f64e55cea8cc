//! Per-task execution pipeline: re-reads the owning batch, guards against
//! a stopped batch and empty input, calls the upstream API, parses its SSE
//! body, classifies the outcome, and writes the resulting task/batch state.
//!
//! A worker hands this crate one task id at a time; everything from the
//! `queued -> running` transition onward lives here, mirroring the single
//! `processTask` entry point the upstream implementation uses.

mod collaborators;
mod error;
mod unicode_escape;

pub use collaborators::{InstalledAppLookup, MintedToken, TokenMinter, UserGate};
pub use error::ExecutorError;

#[cfg(test)]
pub use collaborators::{MockInstalledAppLookup, MockTokenMinter, MockUserGate};

use std::sync::Arc;

use batch_domain::{Batch, BatchRepository, BatchStatus, TaskRepository, TaskStatus};
use observability::BatchMetrics;
use upstream_client::{AppMode, UpstreamClient};
use uuid::Uuid;

/// Canonical message recorded on a batch/task reached by a balance-
/// exhaustion cascade.
pub const INSUFFICIENT_BALANCE_MESSAGE: &str = "Insufficient balance, call failed";

const SKIPPED_EMPTY_INPUT_TEXT: &str = "input was empty, skipped";

pub struct TaskExecutor {
    batches: Arc<dyn BatchRepository>,
    tasks: Arc<dyn TaskRepository>,
    upstream: UpstreamClient,
    token_minter: Arc<dyn TokenMinter>,
    user_gate: Arc<dyn UserGate>,
    app_lookup: Arc<dyn InstalledAppLookup>,
    max_retry_count: i32,
}

impl TaskExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batches: Arc<dyn BatchRepository>,
        tasks: Arc<dyn TaskRepository>,
        upstream: UpstreamClient,
        token_minter: Arc<dyn TokenMinter>,
        user_gate: Arc<dyn UserGate>,
        app_lookup: Arc<dyn InstalledAppLookup>,
        max_retry_count: i32,
    ) -> Self {
        Self {
            batches,
            tasks,
            upstream,
            token_minter,
            user_gate,
            app_lookup,
            max_retry_count,
        }
    }

    /// Runs the full pipeline for one task, already moved to `queued` by
    /// the scheduler. Every outcome (success, retry, terminal failure,
    /// cascade) is written to the store before this returns; errors
    /// returned here are store-access failures the caller should log and
    /// move on from, not something to retry inline.
    pub async fn execute(&self, task_id: Uuid) -> Result<(), ExecutorError> {
        self.tasks.mark_running(task_id).await?;
        let task = self.tasks.get(task_id).await?;
        let batch = self.batches.get(task.batch_id).await?;

        if batch.status == BatchStatus::Stopped {
            self.fail_or_retry(task_id, &batch, "batch stopped".to_string())
                .await?;
            return Ok(());
        }

        if task.inputs.values().all(|v| v.trim().is_empty()) {
            self.complete_with_skip(task_id, &batch).await?;
            return Ok(());
        }

        if !self.user_gate.is_user_active(batch.user_id).await? {
            self.fail_or_retry(task_id, &batch, "user disabled".to_string())
                .await?;
            return Ok(());
        }

        let minted = match self.token_minter.mint(batch.user_id).await {
            Ok(m) => m,
            Err(e) => {
                self.fail_or_retry(task_id, &batch, format!("token minting failed: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let mode = match self.app_lookup.mode(&batch.installed_app_id).await {
            Ok(m) => m,
            Err(e) => {
                self.fail_or_retry(task_id, &batch, format!("app lookup failed: {e}"))
                    .await?;
                return Ok(());
            }
        };

        let response = self
            .upstream
            .call_task(
                &batch.installed_app_id,
                mode,
                &task.inputs,
                &minted.user_token,
                minted.csrf_token.as_deref(),
            )
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                if is_balance_signature(&e.to_string()) {
                    self.cascade(task_id, &batch).await?;
                } else {
                    self.fail_or_retry(task_id, &batch, format!("upstream call failed: {e}"))
                        .await?;
                }
                return Ok(());
            }
        };

        if !response.is_success() {
            if response.status == 403 && is_balance_signature(&response.body) {
                self.cascade(task_id, &batch).await?;
                return Ok(());
            }
            self.fail_or_retry(
                task_id,
                &batch,
                format!("upstream returned status {}: {}", response.status, response.body),
            )
            .await?;
            return Ok(());
        }

        let result = sse_parser::parse_sse_stream(&response.body);

        if !result.succeeded() {
            if is_balance_signature(&response.body) || is_balance_signature(&result.error) {
                self.cascade(task_id, &batch).await?;
                return Ok(());
            }
            let message = if result.error.is_empty() {
                "workflow failed".to_string()
            } else {
                result.error.clone()
            };
            self.fail_or_retry(task_id, &batch, message).await?;
            return Ok(());
        }

        let result_json = serde_json::to_value(&result).unwrap_or_default();
        self.tasks.mark_completed(task_id, result_json).await?;
        self.advance_processed_rows(&batch).await?;
        BatchMetrics::record_task_completed();
        self.check_completion(task.batch_id).await?;
        Ok(())
    }

    async fn complete_with_skip(&self, task_id: Uuid, batch: &Batch) -> Result<(), ExecutorError> {
        let result = serde_json::json!({
            "status": "completed",
            "message": SKIPPED_EMPTY_INPUT_TEXT,
            "outputs": { "text": SKIPPED_EMPTY_INPUT_TEXT },
        });
        self.tasks.mark_completed(task_id, result).await?;
        self.advance_processed_rows(batch).await?;
        self.check_completion(batch.id).await?;
        Ok(())
    }

    async fn advance_processed_rows(&self, batch: &Batch) -> Result<(), ExecutorError> {
        self.batches
            .set_processed_rows(batch.id, batch.processed_rows + 1)
            .await?;
        Ok(())
    }

    /// Increments the task's error_count (retry or terminal fail per
    /// `max_retry_count`) and mirrors the decoded message onto the batch.
    async fn fail_or_retry(&self, task_id: Uuid, batch: &Batch, message: String) -> Result<(), ExecutorError> {
        let decoded = unicode_escape::decode_unicode_escapes(&message);
        tracing::warn!(task_id = %task_id, batch_id = %batch.id, error = %decoded, "task attempt failed");

        let new_status = self
            .tasks
            .record_retry_or_fail(task_id, decoded.clone(), self.max_retry_count)
            .await?;

        self.batches.record_error(batch.id, decoded).await?;

        match new_status {
            TaskStatus::Failed => BatchMetrics::record_task_failed(),
            _ => BatchMetrics::record_task_retried(),
        }

        self.check_completion(batch.id).await?;
        Ok(())
    }

    /// Balance-exhaustion cascade: fails the current batch and task, then
    /// every other pending batch (and its pending tasks) of the same user.
    async fn cascade(&self, task_id: Uuid, batch: &Batch) -> Result<(), ExecutorError> {
        tracing::warn!(
            user_id = %batch.user_id,
            batch_id = %batch.id,
            "insufficient balance detected, cascading failure across user's pending work"
        );

        let other_batches = self
            .batches
            .cascade_insufficient_balance(
                batch.user_id,
                batch.id,
                INSUFFICIENT_BALANCE_MESSAGE.to_string(),
            )
            .await?;

        self.tasks
            .fail_all_runnable_for_batch(batch.id, INSUFFICIENT_BALANCE_MESSAGE.to_string())
            .await?;

        if !other_batches.is_empty() {
            self.tasks
                .fail_pending_for_batches(&other_batches, INSUFFICIENT_BALANCE_MESSAGE.to_string())
                .await?;
        }

        self.tasks
            .mark_failed(task_id, INSUFFICIENT_BALANCE_MESSAGE.to_string())
            .await?;
        BatchMetrics::record_task_failed();
        Ok(())
    }

    /// After every terminal transition: closes the batch out if every task
    /// succeeded, or fails it if nothing runnable remains but at least one
    /// task failed. Safe to call redundantly from concurrent workers.
    async fn check_completion(&self, batch_id: Uuid) -> Result<(), ExecutorError> {
        let counts = self.tasks.status_counts(batch_id).await?;
        let completed = *counts.get(&TaskStatus::Completed).unwrap_or(&0);
        let failed = *counts.get(&TaskStatus::Failed).unwrap_or(&0);
        let batch = self.batches.get(batch_id).await?;

        if completed == batch.total_rows as i64 {
            self.batches.set_processed_rows(batch_id, completed as i32).await?;
            self.batches.reset_error_count(batch_id).await?;
            self.batches
                .set_status(batch_id, BatchStatus::Completed, None)
                .await?;
        } else if batch_domain::no_runnable_remaining(&counts) && failed > 0 {
            let tasks = self.tasks.list_by_batch(batch_id).await?;
            let first_failed_error = tasks
                .into_iter()
                .find(|t| t.status == TaskStatus::Failed)
                .and_then(|t| t.error);
            self.batches
                .set_status(batch_id, BatchStatus::Failed, first_failed_error)
                .await?;
        }
        Ok(())
    }
}

/// Matches the upstream's two balance-exhaustion signatures: an HTTP-layer
/// "Insufficient balance" error, or a workflow result whose body/error
/// contains "call failed" or "Insufficient balance".
fn is_balance_signature(text: &str) -> bool {
    text.contains("Insufficient balance") || text.contains("call failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use batch_domain::{MockBatchRepository, MockTaskRepository, Task};
    use chrono::Utc;
    use std::collections::HashMap;

    #[test]
    fn balance_signature_matches_either_phrase() {
        assert!(is_balance_signature("403: Insufficient balance"));
        assert!(is_balance_signature("workflow call failed upstream"));
        assert!(!is_balance_signature("network timeout"));
    }

    fn sample_batch(status: BatchStatus) -> Batch {
        Batch {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            installed_app_id: "app-1".to_string(),
            file_name: "rows.csv".to_string(),
            total_rows: 3,
            processed_rows: 0,
            status,
            key_mapping: vec![("name".to_string(), "Name".to_string())],
            last_error: None,
            error_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_task(batch_id: Uuid, inputs: HashMap<String, String>) -> Task {
        Task {
            id: Uuid::now_v7(),
            batch_id,
            row_index: 0,
            inputs,
            status: TaskStatus::Queued,
            result: None,
            error: None,
            error_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn executor(
        batches: MockBatchRepository,
        tasks: MockTaskRepository,
    ) -> TaskExecutor {
        TaskExecutor::new(
            Arc::new(batches),
            Arc::new(tasks),
            UpstreamClient::new("http://upstream.invalid").unwrap(),
            Arc::new(MockTokenMinter::new()),
            Arc::new(MockUserGate::new()),
            Arc::new(MockInstalledAppLookup::new()),
            3,
        )
    }

    #[tokio::test]
    async fn stopped_batch_fails_task_without_calling_upstream() {
        let batch = sample_batch(BatchStatus::Stopped);
        let batch_id = batch.id;
        let task = sample_task(batch_id, HashMap::from([("name".to_string(), "Ada".to_string())]));
        let task_id = task.id;

        let mut tasks = MockTaskRepository::new();
        tasks.expect_mark_running().returning(|_| Box::pin(async { Ok(()) }));
        tasks
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(task.clone()) }));
        tasks
            .expect_record_retry_or_fail()
            .returning(|_, _, _| Box::pin(async { Ok(TaskStatus::Pending) }));
        tasks
            .expect_status_counts()
            .returning(|_| Box::pin(async { Ok(HashMap::from([(TaskStatus::Pending, 1)])) }));

        let mut batches = MockBatchRepository::new();
        batches
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(batch.clone()) }));
        batches.expect_record_error().returning(|_, _| Box::pin(async { Ok(()) }));

        let exec = executor(batches, tasks);
        exec.execute(task_id).await.unwrap();
    }

    #[tokio::test]
    async fn empty_input_completes_without_calling_upstream() {
        let mut batch = sample_batch(BatchStatus::Processing);
        batch.total_rows = 1;
        let batch_id = batch.id;
        let task = sample_task(batch_id, HashMap::from([("name".to_string(), "   ".to_string())]));
        let task_id = task.id;

        let mut tasks = MockTaskRepository::new();
        tasks.expect_mark_running().returning(|_| Box::pin(async { Ok(()) }));
        tasks
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(task.clone()) }));
        tasks
            .expect_mark_completed()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        tasks
            .expect_status_counts()
            .returning(|_| Box::pin(async { Ok(HashMap::from([(TaskStatus::Completed, 1)])) }));

        let mut batches = MockBatchRepository::new();
        batches
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(batch.clone()) }));
        batches
            .expect_set_processed_rows()
            .returning(|_, _| Box::pin(async { Ok(()) }));
        batches
            .expect_reset_error_count()
            .returning(|_| Box::pin(async { Ok(()) }));
        batches
            .expect_set_status()
            .returning(|_, _, _| Box::pin(async { Ok(()) }));

        let exec = executor(batches, tasks);
        exec.execute(task_id).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_user_fails_without_minting_a_token() {
        let batch = sample_batch(BatchStatus::Processing);
        let batch_id = batch.id;
        let task = sample_task(batch_id, HashMap::from([("name".to_string(), "Ada".to_string())]));
        let task_id = task.id;

        let mut tasks = MockTaskRepository::new();
        tasks.expect_mark_running().returning(|_| Box::pin(async { Ok(()) }));
        tasks
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(task.clone()) }));
        tasks
            .expect_record_retry_or_fail()
            .returning(|_, _, _| Box::pin(async { Ok(TaskStatus::Pending) }));
        tasks
            .expect_status_counts()
            .returning(|_| Box::pin(async { Ok(HashMap::from([(TaskStatus::Pending, 1)])) }));

        let mut batches = MockBatchRepository::new();
        batches
            .expect_get()
            .returning(move |_| Box::pin(async move { Ok(batch.clone()) }));
        batches.expect_record_error().returning(|_, _| Box::pin(async { Ok(()) }));

        let mut user_gate = MockUserGate::new();
        user_gate
            .expect_is_user_active()
            .returning(|_| Box::pin(async { Ok(false) }));

        let exec = TaskExecutor::new(
            Arc::new(batches),
            Arc::new(tasks),
            UpstreamClient::new("http://upstream.invalid").unwrap(),
            Arc::new(MockTokenMinter::new()),
            Arc::new(user_gate),
            Arc::new(MockInstalledAppLookup::new()),
            3,
        );
        exec.execute(task_id).await.unwrap();
    }
}
