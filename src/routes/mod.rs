use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::services::rate_limit;

pub mod check;
pub mod error;
pub mod health;
pub mod metrics;
pub mod queue;
pub mod visit;

/// Build the API router. Visitor-facing and admin endpoints sit behind
/// separate rate limiters.
pub fn router(state: AppState) -> Router {
    let visit_routes = Router::new()
        .route("/api/exchanges/{id}/visit", post(visit::record_visit))
        .route("/api/exchanges/{id}/report-claimed", post(visit::report_claimed))
        .route_layer(middleware::from_fn_with_state(
            state.visit_limiter.clone(),
            rate_limit::enforce,
        ));

    let admin_routes = Router::new()
        .route("/api/exchanges/{id}/check", post(check::check_exchange))
        .route("/api/admin/exchanges/check-batch", post(check::check_batch))
        .route_layer(middleware::from_fn_with_state(
            state.admin_limiter.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/queue/status", get(queue::queue_status))
        .merge(visit_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
