use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BatchTasks::Table)
                    .if_not_exists()
                    .col(pk_uuid(BatchTasks::Id))
                    .col(uuid(BatchTasks::BatchId))
                    .col(integer(BatchTasks::RowIndex))
                    .col(json(BatchTasks::Inputs))
                    .col(
                        ColumnDef::new(BatchTasks::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(json_null(BatchTasks::Result))
                    .col(string_null(BatchTasks::Error))
                    .col(integer(BatchTasks::ErrorCount).default(0))
                    .col(
                        timestamp_with_time_zone(BatchTasks::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(BatchTasks::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_batch_tasks_batch_id")
                            .from(BatchTasks::Table, BatchTasks::BatchId)
                            .to(Batches::Table, Batches::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_tasks_batch_id")
                    .table(BatchTasks::Table)
                    .col(BatchTasks::BatchId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_tasks_batch_id_status")
                    .table(BatchTasks::Table)
                    .col(BatchTasks::BatchId)
                    .col(BatchTasks::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_tasks_status_error_count")
                    .table(BatchTasks::Table)
                    .col(BatchTasks::Status)
                    .col(BatchTasks::ErrorCount)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TRIGGER batch_tasks_touch_updated_at
                    BEFORE UPDATE ON batch_tasks
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
            .execute_unprepared("DROP TRIGGER IF EXISTS batch_tasks_touch_updated_at ON batch_tasks")
            .await?;
        manager
            .drop_table(Table::drop().table(BatchTasks::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum BatchTasks {
    Table,
    Id,
    BatchId,
    RowIndex,
    Inputs,
    Status,
    Result,
    Error,
    ErrorCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Batches {
    Table,
    Id,
}
