//! Shared application state passed to every request handler.

use std::sync::Arc;

use batch_domain::{BatchRepository, TaskRepository};
use sea_orm::DatabaseConnection;
use worker_pool::WorkerPool;

use crate::config::AppConfig;
use crate::provider_registry::PgProviderRegistry;

/// Cheap to clone: every field is either an `Arc` or a pool handle that is
/// already internally reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub batches: Arc<dyn BatchRepository>,
    pub tasks: Arc<dyn TaskRepository>,
    pub worker_pool: Arc<WorkerPool>,
    pub proxy: Arc<proxy_engine::ProxyEngine<PgProviderRegistry>>,
}
