//! Batch Service
//!
//! HTTP API for the batch workflow execution platform: batch ingestion,
//! monitoring/control, CSV download, and the upstream proxy.
//!
//! ## Architecture
//!
//! ```text
//! axum Router
//!   -> batches/*      PgBatchRepository / PgTaskRepository
//!   -> proxy/*         ProxyEngine<PgProviderRegistry>
//!                         \-> CredentialCache -> credential_store::decrypt
//!   worker_pool::WorkerPool (background)
//!     -> task_executor::TaskExecutor
//!          -> HttpAdminClient (TokenMinter / UserGate / InstalledAppLookup)
//!          -> upstream_client::UpstreamClient
//! ```

mod api;
mod collaborators;
mod config;
mod provider_registry;
mod state;

use std::sync::Arc;

use core_config::{app_info, Environment, FromEnv};
use database::postgres::{connect_from_config_with_retry, run_migrations};
use eyre::{Result, WrapErr};
use task_executor::TaskExecutor;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use worker_pool::{PoolConfig, WorkerPool};

use collaborators::HttpAdminClient;
use config::AppConfig;
use provider_registry::PgProviderRegistry;
use state::AppState;

pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    core_config::tracing_init::init_tracing(&environment);
    observability::init_metrics();

    let info = app_info!();
    info!(name = %info.name, version = %info.version, "starting batch service");

    let config = AppConfig::from_env().wrap_err("failed to load configuration")?;

    info!("connecting to postgresql...");
    let db = connect_from_config_with_retry(config.database.clone(), None)
        .await
        .wrap_err("failed to connect to postgresql")?;
    run_migrations::<migration::Migrator>(&db, info.name)
        .await
        .wrap_err("failed to run database migrations")?;
    info!("connected to postgresql and migrations applied");

    let batches: Arc<dyn batch_domain::BatchRepository> =
        Arc::new(batch_domain::PgBatchRepository::new(db.clone()));
    let tasks: Arc<dyn batch_domain::TaskRepository> =
        Arc::new(batch_domain::PgTaskRepository::new(db.clone()));

    let admin_client = Arc::new(HttpAdminClient::new(config.admin_base_url.clone()));
    let upstream = upstream_client::UpstreamClient::new(config.batch.upstream_base_url.clone())
        .wrap_err("failed to build upstream client")?;

    let executor = Arc::new(TaskExecutor::new(
        batches.clone(),
        tasks.clone(),
        upstream,
        admin_client.clone() as Arc<dyn task_executor::TokenMinter>,
        admin_client.clone() as Arc<dyn task_executor::UserGate>,
        admin_client.clone() as Arc<dyn task_executor::InstalledAppLookup>,
        config.batch.max_retry_count as i32,
    ));

    let pool_config = PoolConfig {
        capacity: config.batch.workers,
        penalty_threshold: config.batch.error_penalty_threshold as i64,
        max_retry_count: config.batch.max_retry_count as i32,
    };
    let worker_pool = Arc::new(WorkerPool::new(
        batches.clone(),
        tasks.clone(),
        executor.clone(),
        pool_config,
    ));
    worker_pool.start().await.wrap_err("failed to start worker pool")?;

    let provider_registry = PgProviderRegistry::new(
        db.clone(),
        config.tenant_id.clone(),
        config.batch.storage_path.clone(),
    );
    let proxy = Arc::new(proxy_engine::ProxyEngine::new(provider_registry).wrap_err("failed to build proxy engine")?);

    let state = AppState {
        config: Arc::new(config.clone()),
        db,
        batches,
        tasks,
        worker_pool: worker_pool.clone(),
        proxy,
    };

    let app = api::router(state)
        .layer(axum::middleware::from_fn(observability::middleware::metrics_middleware))
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let address = config.server.address();
    let listener = TcpListener::bind(&address)
        .await
        .wrap_err_with(|| format!("failed to bind to {address}"))?;
    info!(address = %address, "batch service listening");

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!(error = %e, "error waiting for shutdown signal");
        }
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await
        .wrap_err("server failed")?;

    worker_pool.stop().await.wrap_err("failed to stop worker pool")?;
    info!("batch service stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, initiating shutdown"),
        _ = terminate => info!("received sigterm, initiating shutdown"),
    }

    Ok(())
}
