use chrono::{DateTime, Utc};
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a [`Batch`]. See the module invariants in `lib.rs` for the
/// legal transitions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum BatchStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "stopped")]
    Stopped,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Lifecycle of a [`Task`] within a batch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TaskStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl TaskStatus {
    pub fn is_runnable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Queued)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Maximum number of retries a task gets before it is marked terminally
/// failed. Mirrors `core_config::BatchConfig::max_retry_count`'s default;
/// callers that load config should prefer that value.
pub const DEFAULT_MAX_RETRY_COUNT: i32 = 3;

/// Cumulative error count at which a user's base worker allocation is
/// reduced by one. Mirrors `core_config::BatchConfig::error_penalty_threshold`.
pub const DEFAULT_ERROR_PENALTY_THRESHOLD: i64 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub installed_app_id: String,
    pub file_name: String,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub status: BatchStatus,
    /// Ordered `[key, column-name]` pairs, in source-file header order.
    pub key_mapping: Vec<(String, String)>,
    pub last_error: Option<String>,
    pub error_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entity::batch::Model> for Batch {
    fn from(m: crate::entity::batch::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            installed_app_id: m.installed_app_id,
            file_name: m.file_name,
            total_rows: m.total_rows,
            processed_rows: m.processed_rows,
            status: m.status,
            key_mapping: m.key_mapping_ordered(),
            last_error: m.last_error,
            error_count: m.error_count,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub row_index: i32,
    pub inputs: HashMap<String, String>,
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<crate::entity::task::Model> for Task {
    fn from(m: crate::entity::task::Model) -> Self {
        Self {
            id: m.id,
            batch_id: m.batch_id,
            row_index: m.row_index,
            inputs: serde_json::from_value(m.inputs).unwrap_or_default(),
            status: m.status,
            result: m.result,
            error: m.error,
            error_count: m.error_count,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

/// Request to create a new batch from an uploaded 2D table. `rows` includes
/// the header row at index 0; empty rows are skipped by the service layer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatch {
    pub user_id: Uuid,
    pub installed_app_id: String,
    pub file_name: String,
    pub rows: Vec<Vec<String>>,
    /// Optional header-name -> column-key override, keyed by header cell
    /// text; defaults to using the header cell text verbatim as the key.
    pub key_mapping: Option<HashMap<String, String>>,
}

/// Per-status task counts plus the derived completion percentage, returned
/// by `GetProgress`.
#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub total_rows: i32,
    pub pending: i64,
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub percent: f64,
    pub last_error: Option<String>,
}

impl BatchProgress {
    pub fn percent_complete(completed: i64, total: i32) -> f64 {
        if total <= 0 {
            return 0.0;
        }
        (completed as f64 / total as f64) * 100.0
    }
}
