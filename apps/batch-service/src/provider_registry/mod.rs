//! [`proxy_engine::ProviderRegistry`] backed by the `provider_configs`
//! table: one row per tenant/provider pair, with credential resolution
//! cached in front of the RSA/AES decryption path.

mod entity;

use async_trait::async_trait;
use credential_store::{CredentialCache, ResolvedCredentials};
use proxy_engine::{ProviderRegistry, ProxyError};
use sea_orm::{DatabaseConnection, EntityTrait};
use sea_orm::{ColumnTrait, QueryFilter};

pub struct PgProviderRegistry {
    db: DatabaseConnection,
    cache: CredentialCache,
    tenant_id: String,
    storage_path: String,
}

impl PgProviderRegistry {
    pub fn new(db: DatabaseConnection, tenant_id: String, storage_path: String) -> Self {
        Self {
            db,
            cache: CredentialCache::new(),
            tenant_id,
            storage_path,
        }
    }

    async fn find(&self, provider: &str) -> Option<entity::Model> {
        entity::Entity::find()
            .filter(entity::Column::TenantId.eq(self.tenant_id.as_str()))
            .filter(entity::Column::Provider.eq(provider))
            .one(&self.db)
            .await
            .ok()
            .flatten()
    }
}

#[async_trait]
impl ProviderRegistry for PgProviderRegistry {
    async fn is_provider_enabled(&self, provider: &str) -> bool {
        self.find(provider).await.is_some_and(|row| row.enabled)
    }

    async fn is_model_enabled(&self, provider: &str, model: &str) -> bool {
        match self.find(provider).await {
            Some(row) => {
                let allowed = row.models_enabled_list();
                allowed.is_empty() || allowed.iter().any(|m| m == model)
            }
            None => false,
        }
    }

    async fn credentials(&self, provider: &str) -> Result<ResolvedCredentials, ProxyError> {
        if let Some(cached) = self.cache.get(provider).await {
            return Ok(cached);
        }

        let row = self
            .find(provider)
            .await
            .ok_or_else(|| ProxyError::ProviderDisabled(provider.to_string()))?;

        let config_json = row.encrypted_config.to_string();
        let resolved = credential_store::resolve_credentials(&config_json, &self.tenant_id, &self.storage_path)
            .map_err(|e| ProxyError::Credentials(e.to_string()))?;

        self.cache.put(provider, resolved.clone()).await;
        Ok(resolved)
    }
}
