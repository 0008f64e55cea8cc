//! Prometheus metrics and HTTP instrumentation for the batch workflow
//! platform.
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler};
//!
//! init_metrics();
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod batch_metrics;
pub mod middleware;

pub use batch_metrics::BatchMetrics;
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the process-wide Prometheus recorder. Call once at startup.
pub fn init_metrics() -> &'static PrometheusHandle {
    METRICS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        info!("prometheus metrics recorder initialized");
        register_metric_descriptions();
        handle
    })
}

pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for `/metrics`.
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!("http_requests_total", "Total HTTP requests handled");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds"
    );
    describe_counter!(
        "batch_tasks_completed_total",
        "Tasks that reached a terminal completed state"
    );
    describe_counter!(
        "batch_tasks_failed_total",
        "Tasks that reached a terminal failed state"
    );
    describe_counter!(
        "batch_tasks_retried_total",
        "Tasks reverted from running back to pending for retry"
    );
    describe_gauge!(
        "worker_pool_allocated_workers",
        "Workers currently allocated to a user by the fair-share allocator"
    );
    describe_gauge!(
        "worker_pool_live_workers",
        "Workers currently running for a user"
    );
    describe_counter!(
        "proxy_requests_total",
        "Requests forwarded through the proxy engine"
    );
}
