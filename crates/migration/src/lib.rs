pub use sea_orm_migration::prelude::*;

mod m20250101_000001_bootstrap;
mod m20250101_000002_create_batches;
mod m20250101_000003_create_batch_tasks;
mod m20250101_000004_create_provider_configs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_bootstrap::Migration),
            Box::new(m20250101_000002_create_batches::Migration),
            Box::new(m20250101_000003_create_batch_tasks::Migration),
            Box::new(m20250101_000004_create_provider_configs::Migration),
        ]
    }
}
