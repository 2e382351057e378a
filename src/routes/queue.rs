use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::app_state::AppState;
use crate::models::visit::{QueueStats, QueueStatusResponse};
use crate::services::best_effort::best_effort;

/// GET /api/queue/status — queue depth and worker health.
///
/// Starts the worker if this process has not started it yet, unless the
/// worker runs as its own process.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    if state.embedded_worker && state.worker.start() {
        tracing::info!("Detection worker started by queue status query");
    }

    let length = best_effort("queue_length", state.queue.length())
        .await
        .unwrap_or_default();
    let pending_count = best_effort("queue_pending_count", state.queue.pending_count())
        .await
        .unwrap_or_default();
    metrics::gauge!("detection_queue_depth").set(length as f64);

    Json(QueueStatusResponse {
        queue: QueueStats {
            length,
            pending_count,
        },
        worker: state.worker.status(),
        timestamp: Utc::now(),
    })
}
