//! Tenant-scoped provider configuration: enablement, per-provider model
//! allowlist, and the raw `encrypted_config` blob `credential-store`
//! decrypts lazily. Local to this binary - the proxy engine only knows
//! the [`proxy_engine::ProviderRegistry`] trait, not this table.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "provider_configs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub provider: String,
    pub enabled: bool,
    /// Allowed model names; an empty list means every model is allowed.
    #[sea_orm(column_type = "Json")]
    pub models_enabled: serde_json::Value,
    #[sea_orm(column_type = "Json")]
    pub encrypted_config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn models_enabled_list(&self) -> Vec<String> {
        serde_json::from_value(self.models_enabled.clone()).unwrap_or_default()
    }
}
