use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::visit::{BatchSummary, CheckResponse};
use crate::routes::error::ApiError;
use crate::services::worker::CheckOutcome;

/// POST /api/exchanges/{id}/check — run detection for one card now.
pub async fn check_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CheckResponse>, ApiError> {
    let exchange = state.store.find_by_id(&id).await?.ok_or(ApiError::NotFound)?;

    let (status, outcome) = state.worker.check_exchange(&exchange).await;

    let (outcome, error) = match outcome {
        None => ("skipped".to_string(), None),
        Some(CheckOutcome::Failed(e)) => ("error".to_string(), Some(e)),
        Some(other) => (other.label().to_string(), None),
    };

    Ok(Json(CheckResponse {
        id: exchange.id,
        status,
        outcome,
        error,
    }))
}

/// POST /api/admin/exchanges/check-batch — check the least recently checked
/// active cards.
pub async fn check_batch(State(state): State<AppState>) -> Result<Json<BatchSummary>, ApiError> {
    let summary = state.worker.run_batch().await?;
    Ok(Json(summary))
}
