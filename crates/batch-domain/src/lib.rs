//! Batch/Task data model and persistence adapter.
//!
//! A [`Batch`] owns a set of [`Task`]s, one per input row. Lifecycle:
//!
//! ```text
//! Batch:  pending -> processing -> completed | failed
//!                                \-> stopped (user action, resumable)
//! Task:   pending -> queued -> running -> completed
//!                                      \-> pending (retry, error_count < max)
//!                                      \-> failed  (error_count >= max)
//!         pending | queued -> cancelled (batch stopped)
//! ```
//!
//! Invariants enforced by the postgres adapter: `processed_rows <=
//! total_rows`; a task's `error_count` never exceeds `max_retry_count`; a
//! task only reaches `running` through [`TaskRepository::mark_running`],
//! which the worker calls after winning the `pending -> queued` CAS.

pub mod csv;
pub mod entity;
pub mod error;
pub mod models;
pub mod postgres;
pub mod repository;

pub use entity::{BatchEntity, TaskEntity};
pub use error::{BatchError, BatchResult};
pub use models::{
    Batch, BatchProgress, BatchStatus, CreateBatch, Task, TaskStatus, DEFAULT_ERROR_PENALTY_THRESHOLD,
    DEFAULT_MAX_RETRY_COUNT,
};
pub use postgres::{PgBatchRepository, PgTaskRepository};
pub use repository::{BatchRepository, NewBatch, TaskRepository};

#[cfg(any(test, feature = "test-util"))]
pub use repository::{MockBatchRepository, MockTaskRepository};

use std::collections::HashMap;
use uuid::Uuid;

/// Expands a [`CreateBatch`] request's raw rows into a [`NewBatch`] ready
/// for [`BatchRepository::create`]. The first row is the header; rows that
/// are entirely empty/whitespace are skipped, matching the upstream's
/// tolerant CSV ingestion.
pub fn prepare_new_batch(create: CreateBatch) -> Result<NewBatch, BatchError> {
    let mut rows = create.rows.into_iter();
    let header = rows
        .next()
        .ok_or_else(|| BatchError::Validation("input table has no header row".to_string()))?;

    let key_mapping: Vec<(String, String)> = header
        .iter()
        .map(|column_name| {
            let key = create
                .key_mapping
                .as_ref()
                .and_then(|m| m.get(column_name))
                .cloned()
                .unwrap_or_else(|| column_name.clone());
            (key, column_name.clone())
        })
        .collect();

    let row_inputs: Vec<HashMap<String, String>> = rows
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            key_mapping
                .iter()
                .enumerate()
                .map(|(i, (key, _))| (key.clone(), row.get(i).cloned().unwrap_or_default()))
                .collect()
        })
        .collect();

    if row_inputs.is_empty() {
        return Err(BatchError::Validation(
            "input table has no non-empty data rows".to_string(),
        ));
    }

    Ok(NewBatch {
        user_id: create.user_id,
        installed_app_id: create.installed_app_id,
        file_name: create.file_name,
        key_mapping,
        row_inputs,
    })
}

/// Whether every task in `counts` is in a terminal state (no
/// `pending`/`queued`/`running` remaining) — used by the completion check.
pub fn no_runnable_remaining(counts: &HashMap<TaskStatus, i64>) -> bool {
    counts.get(&TaskStatus::Pending).copied().unwrap_or(0) == 0
        && counts.get(&TaskStatus::Queued).copied().unwrap_or(0) == 0
        && counts.get(&TaskStatus::Running).copied().unwrap_or(0) == 0
}

/// A no-op placeholder user id used only in doctest/unit-test fixtures in
/// this crate; never used by production code.
#[cfg(test)]
pub(crate) fn test_user_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_new_batch_skips_blank_rows_and_maps_keys() {
        let create = CreateBatch {
            user_id: test_user_id(),
            installed_app_id: "app-1".to_string(),
            file_name: "in.csv".to_string(),
            rows: vec![
                vec!["Question".to_string(), "Context".to_string()],
                vec!["what is rust".to_string(), "lang".to_string()],
                vec!["".to_string(), "   ".to_string()],
                vec!["why".to_string(), "".to_string()],
            ],
            key_mapping: None,
        };

        let new_batch = prepare_new_batch(create).unwrap();
        assert_eq!(new_batch.row_inputs.len(), 2);
        assert_eq!(
            new_batch.row_inputs[0].get("Question"),
            Some(&"what is rust".to_string())
        );
    }

    #[test]
    fn prepare_new_batch_rejects_all_blank_input() {
        let create = CreateBatch {
            user_id: test_user_id(),
            installed_app_id: "app-1".to_string(),
            file_name: "in.csv".to_string(),
            rows: vec![vec!["Question".to_string()], vec!["  ".to_string()]],
            key_mapping: None,
        };

        assert!(prepare_new_batch(create).is_err());
    }

    #[test]
    fn no_runnable_remaining_true_when_only_terminal_statuses() {
        let mut counts = HashMap::new();
        counts.insert(TaskStatus::Completed, 2);
        counts.insert(TaskStatus::Failed, 1);
        assert!(no_runnable_remaining(&counts));
    }

    #[test]
    fn no_runnable_remaining_false_when_pending_exists() {
        let mut counts = HashMap::new();
        counts.insert(TaskStatus::Pending, 1);
        assert!(!no_runnable_remaining(&counts));
    }
}
