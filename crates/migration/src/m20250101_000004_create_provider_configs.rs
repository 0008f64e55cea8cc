use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Tenant-scoped provider configuration backing the proxy engine's
/// `ProviderRegistry`: enablement, the per-provider model allowlist, and
/// the raw `encrypted_config` blob `credential-store` decrypts lazily.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderConfigs::Table)
                    .if_not_exists()
                    .col(pk_uuid(ProviderConfigs::Id))
                    .col(string(ProviderConfigs::TenantId))
                    .col(string(ProviderConfigs::Provider))
                    .col(boolean(ProviderConfigs::Enabled).default(true))
                    .col(json(ProviderConfigs::ModelsEnabled))
                    .col(json(ProviderConfigs::EncryptedConfig))
                    .col(
                        timestamp_with_time_zone(ProviderConfigs::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(ProviderConfigs::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_configs_tenant_provider")
                    .table(ProviderConfigs::Table)
                    .col(ProviderConfigs::TenantId)
                    .col(ProviderConfigs::Provider)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER provider_configs_touch_updated_at
                    BEFORE UPDATE ON provider_configs
                    FOR EACH ROW
                    EXECUTE FUNCTION util.touch_updated_at()
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                "DROP TRIGGER IF EXISTS provider_configs_touch_updated_at ON provider_configs",
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProviderConfigs::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ProviderConfigs {
    Table,
    Id,
    TenantId,
    Provider,
    Enabled,
    ModelsEnabled,
    EncryptedConfig,
    CreatedAt,
    UpdatedAt,
}
