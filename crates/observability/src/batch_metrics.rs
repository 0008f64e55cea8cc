//! Convenience wrappers around the batch-workflow specific gauges/counters.

use metrics::{counter, gauge};

pub struct BatchMetrics;

impl BatchMetrics {
    pub fn record_task_completed() {
        counter!("batch_tasks_completed_total").increment(1);
    }

    pub fn record_task_failed() {
        counter!("batch_tasks_failed_total").increment(1);
    }

    pub fn record_task_retried() {
        counter!("batch_tasks_retried_total").increment(1);
    }

    pub fn set_allocated_workers(user_id: &str, allocated: u32) {
        gauge!("worker_pool_allocated_workers", "user_id" => user_id.to_string())
            .set(allocated as f64);
    }

    pub fn set_live_workers(user_id: &str, live: u32) {
        gauge!("worker_pool_live_workers", "user_id" => user_id.to_string()).set(live as f64);
    }

    pub fn record_proxy_request(provider: &str, status: &str) {
        counter!(
            "proxy_requests_total",
            "provider" => provider.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }
}
