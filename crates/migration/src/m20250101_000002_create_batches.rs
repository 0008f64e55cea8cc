use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

/// `batches.status` is stored as a plain `varchar(16)`, not a Postgres
/// enum type - it mirrors `batch_domain::BatchStatus`'s
/// `DeriveActiveEnum(rs_type = "String")` mapping.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Batches::Table)
                    .if_not_exists()
                    .col(pk_uuid(Batches::Id))
                    .col(uuid(Batches::UserId))
                    .col(string(Batches::InstalledAppId))
                    .col(string(Batches::FileName))
                    .col(integer(Batches::TotalRows))
                    .col(integer(Batches::ProcessedRows).default(0))
                    .col(
                        ColumnDef::new(Batches::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(json(Batches::KeyMapping))
                    .col(string_null(Batches::LastError))
                    .col(integer(Batches::ErrorCount).default(0))
                    .col(
                        timestamp_with_time_zone(Batches::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Batches::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batches_user_id_status")
                    .table(Batches::Table)
                    .col(Batches::UserId)
                    .col(Batches::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER batches_touch_updated_at
                    BEFORE UPDATE ON batches
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
            .execute_unprepared("DROP TRIGGER IF EXISTS batches_touch_updated_at ON batches")
            .await?;
        manager
            .drop_table(Table::drop().table(Batches::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Batches {
    Table,
    Id,
    UserId,
    InstalledAppId,
    FileName,
    TotalRows,
    ProcessedRows,
    Status,
    KeyMapping,
    LastError,
    ErrorCount,
    CreatedAt,
    UpdatedAt,
}
