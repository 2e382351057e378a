use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use chrono::Utc;
use garde::Validate;

use crate::app_state::AppState;
use crate::models::exchange::ExchangeStatus;
use crate::models::visit::{VisitRequest, VisitResponse};
use crate::routes::error::ApiError;
use crate::services::best_effort::best_effort;
use crate::services::queue::QueueItem;

pub const VISIT_RECORDED: &str = "访问已记录，正在检测卡片状态";

const AUTOMATED_AGENT_MARKERS: &[&str] = &[
    "bot",
    "spider",
    "crawler",
    "curl",
    "wget",
    "python-requests",
    "headless",
];

/// Visits without a browser-like User-Agent are not allowed to trigger
/// detection.
pub fn is_automated_agent(headers: &HeaderMap) -> bool {
    let agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();

    agent.is_empty() || AUTOMATED_AGENT_MARKERS.iter().any(|m| agent.contains(m))
}

fn parse_visit_body(body: &Bytes) -> Result<VisitRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(VisitRequest::default());
    }
    let request: VisitRequest = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("请求格式错误: {e}")))?;
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("请求参数无效: {e}")))?;
    Ok(request)
}

fn terminal_response(status: ExchangeStatus) -> Json<VisitResponse> {
    Json(VisitResponse {
        success: true,
        status: Some(status),
        message: status.visitor_message().to_string(),
    })
}

/// POST /api/exchanges/{id}/visit — record a visit and schedule detection.
///
/// Cache and queue failures are logged and skipped; only an unknown id or a
/// store failure reaches the caller as an error.
pub async fn record_visit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<VisitResponse>, ApiError> {
    if is_automated_agent(&headers) {
        metrics::counter!("card_visits_total", "outcome" => "rejected_agent").increment(1);
        return Err(ApiError::Forbidden("请使用浏览器访问".to_string()));
    }

    let request = parse_visit_body(&body)?;

    if let Some(Some(status)) = best_effort("status_cache_get", state.cache.get(&id)).await {
        metrics::counter!("card_visits_total", "outcome" => "cached").increment(1);
        return Ok(terminal_response(status));
    }

    let exchange = state.store.find_by_id(&id).await?.ok_or(ApiError::NotFound)?;

    if exchange.status.is_terminal() {
        best_effort(
            "status_cache_set",
            state.cache.set(&id, exchange.status, state.status_cache_ttl),
        )
        .await;
        metrics::counter!("card_visits_total", "outcome" => "terminal").increment(1);
        return Ok(terminal_response(exchange.status));
    }

    let item = QueueItem {
        original_url: request.original_url,
        ..QueueItem::new(exchange.id, exchange.share_token)
    };

    match best_effort("queue_enqueue", state.queue.enqueue_if_absent(&item)).await {
        Some(true) => tracing::info!(card_id = %item.card_id, "Queued card for detection"),
        Some(false) => tracing::debug!(card_id = %item.card_id, "Card already queued"),
        None => {}
    }
    metrics::counter!("card_visits_total", "outcome" => "recorded").increment(1);

    Ok(Json(VisitResponse {
        success: true,
        status: None,
        message: VISIT_RECORDED.to_string(),
    }))
}

/// POST /api/exchanges/{id}/report-claimed — a visitor reports the card as
/// already taken.
pub async fn report_claimed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VisitResponse>, ApiError> {
    let exchange = state.store.find_by_id(&id).await?.ok_or(ApiError::NotFound)?;

    state
        .store
        .record_check(&exchange.id, Some(ExchangeStatus::Claimed), Utc::now())
        .await?;
    best_effort(
        "status_cache_set",
        state
            .cache
            .set(&exchange.id, ExchangeStatus::Claimed, state.status_cache_ttl),
    )
    .await;

    tracing::info!(card_id = %exchange.id, previous = %exchange.status, "Card reported claimed");
    Ok(terminal_response(ExchangeStatus::Claimed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_agent(agent: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(agent));
        headers
    }

    #[test]
    fn test_browser_agent_is_allowed() {
        let headers = with_agent(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15",
        );
        assert!(!is_automated_agent(&headers));
    }

    #[test]
    fn test_missing_or_bot_agent_is_rejected() {
        assert!(is_automated_agent(&HeaderMap::new()));
        assert!(is_automated_agent(&with_agent("   ")));
        assert!(is_automated_agent(&with_agent("Googlebot/2.1")));
        assert!(is_automated_agent(&with_agent("curl/8.4.0")));
        assert!(is_automated_agent(&with_agent("Mozilla/5.0 HeadlessChrome/120.0")));
    }

    #[test]
    fn test_empty_body_is_default_request() {
        let request = parse_visit_body(&Bytes::new()).unwrap();
        assert!(request.original_url.is_none());
    }

    #[test]
    fn test_body_is_parsed_and_validated() {
        let body = Bytes::from_static(br#"{"originalUrl":"https://share.example.com/c/1"}"#);
        let request = parse_visit_body(&body).unwrap();
        assert_eq!(request.original_url.as_deref(), Some("https://share.example.com/c/1"));

        assert!(parse_visit_body(&Bytes::from_static(b"{not json")).is_err());
        assert!(parse_visit_body(&Bytes::from_static(br#"{"originalUrl":""}"#)).is_err());
    }
}
