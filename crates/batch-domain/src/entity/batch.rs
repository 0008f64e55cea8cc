use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::models::BatchStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub installed_app_id: String,
    pub file_name: String,
    pub total_rows: i32,
    pub processed_rows: i32,
    pub status: BatchStatus,
    /// Ordered `[key, column-name]` pairs, in source-file header order;
    /// used to rebuild the header row on download.
    #[sea_orm(column_type = "Json")]
    pub key_mapping: serde_json::Value,
    pub last_error: Option<String>,
    pub error_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::task::Entity")]
    Task,
}

impl Related<super::task::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Task.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn key_mapping_ordered(&self) -> Vec<(String, String)> {
        serde_json::from_value(self.key_mapping.clone()).unwrap_or_default()
    }
}
