//! Batch Service - Entry Point
//!
//! HTTP API for the batch workflow execution platform: batch ingestion,
//! monitoring/control, CSV download, and the upstream proxy.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    batch_service::run().await
}
