use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;

/// Install the Prometheus recorder and describe the pipeline's metrics.
pub fn install_recorder() -> Result<Arc<PrometheusHandle>, metrics_exporter_prometheus::BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("card_visits_total", "Visit requests by outcome");
    metrics::describe_counter!("card_lookups_total", "Card-info lookups by outcome");
    metrics::describe_histogram!("card_lookup_seconds", "Card-info lookup latency");
    metrics::describe_gauge!(
        "detection_queue_depth",
        "Items waiting in the detection queue"
    );
    metrics::describe_counter!(
        "rate_limit_rejections_total",
        "Requests rejected by a rate limiter"
    );
    metrics::describe_counter!(
        "best_effort_failures_total",
        "Cache or queue operations that failed and were skipped"
    );

    Ok(Arc::new(handle))
}

/// GET /metrics — Prometheus text exposition format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    )
}
