//! Fixed-window request limiter keyed by client identity.
//!
//! Records live in process memory, so under a multi-process deployment the
//! limit applies per process. Bursts of up to `2 * max` are possible across a
//! window boundary.

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Derives the rate-limit key from request headers.
pub type KeyGenerator = fn(&HeaderMap) -> String;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max: u32,
    pub window: Duration,
    pub message: String,
    pub key_generator: KeyGenerator,
}

impl RateLimitConfig {
    pub fn new(max: u32, window: Duration, message: impl Into<String>) -> Self {
        Self {
            max,
            window,
            message: message.into(),
            key_generator: client_ip,
        }
    }
}

/// Client address from `x-forwarded-for` (first hop), then `x-real-ip`,
/// then the `"unknown"` bucket.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

#[derive(Debug, Clone, Copy)]
struct RateLimitRecord {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitDecision {
    Allowed { limit: u32, remaining: u32 },
    Rejected(RateLimitRejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRejection {
    pub limit: u32,
    /// Unix timestamp (seconds) at which the window resets
    pub reset: u64,
    /// Seconds until the window resets, rounded up
    pub retry_after: u64,
    pub message: String,
}

impl IntoResponse for RateLimitRejection {
    fn into_response(self) -> Response {
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response();

        let headers = response.headers_mut();
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(0u32));
        headers.insert("x-ratelimit-reset", HeaderValue::from(self.reset));
        headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    records: DashMap<String, RateLimitRecord>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Count one request for `key` as of `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut record = self
            .records
            .entry(key.to_string())
            .or_insert(RateLimitRecord {
                count: 0,
                reset_at: now + self.config.window,
            });

        if now > record.reset_at {
            *record = RateLimitRecord {
                count: 0,
                reset_at: now + self.config.window,
            };
        }

        record.count = record.count.saturating_add(1);

        if record.count > self.config.max {
            let remaining_window = record.reset_at.saturating_duration_since(now);
            let retry_after = remaining_window.as_millis().div_ceil(1000) as u64;
            let reset = SystemTime::now()
                .checked_add(remaining_window)
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or_default();

            return RateLimitDecision::Rejected(RateLimitRejection {
                limit: self.config.max,
                reset,
                retry_after,
                message: self.config.message.clone(),
            });
        }

        RateLimitDecision::Allowed {
            limit: self.config.max,
            remaining: self.config.max - record.count,
        }
    }

    /// Drop every record whose window has elapsed. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        // Handlers may insert while retain walks the shards, so count in place.
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = now <= record.reset_at;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    /// Sweep expired records every `every` for the life of the process.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = limiter.sweep_expired();
                if removed > 0 {
                    tracing::debug!(removed, "Swept expired rate-limit records");
                }
            }
        })
    }
}

/// axum middleware applying a limiter to every request it wraps.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = (limiter.config().key_generator)(request.headers());

    match limiter.check(&key) {
        RateLimitDecision::Rejected(rejection) => {
            tracing::info!(key = %key, retry_after = rejection.retry_after, "Rate limit exceeded");
            metrics::counter!("rate_limit_rejections_total").increment(1);
            rejection.into_response()
        }
        RateLimitDecision::Allowed { limit, remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(HeaderName::from_static("x-ratelimit-limit"), HeaderValue::from(limit));
            headers.insert(
                HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(remaining),
            );
            response
        }
    }
}
