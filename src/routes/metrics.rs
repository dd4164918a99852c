use axum::extract::State;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Register descriptions for the recognition pipeline metrics.
pub fn describe() {
    metrics::describe_counter!("recognition_jobs_total", "Menu recognition jobs created");
    metrics::describe_counter!(
        "recognition_jobs_completed",
        "Menu recognition jobs that reached completed"
    );
    metrics::describe_counter!(
        "recognition_jobs_failed",
        "Menu recognition jobs that reached failed"
    );
    metrics::describe_counter!(
        "catalog_dish_upsert_failures",
        "Dish upserts skipped during catalog reconciliation"
    );
    metrics::describe_counter!(
        "recognition_terminal_write_failures",
        "Store errors while writing a job's terminal state"
    );
    metrics::describe_histogram!(
        "recognition_processing_seconds",
        "Time from dispatch to terminal state for a recognition job"
    );
    metrics::describe_gauge!(
        "recognition_jobs_in_flight",
        "Recognition jobs created but not yet terminal"
    );
}

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> String {
    handle.render()
}
