use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::db::{queries::PgCardExchangeStore, CardExchangeStore};
use crate::services::{
    card_info::{CardInfoClient, CardInfoProvider, LookupError},
    queue::{DedupQueue, InMemoryDedupQueue, QueueError, RedisDedupQueue},
    rate_limit::{RateLimitConfig, RateLimiter},
    status_cache::{CacheError, InMemoryStatusCache, RedisStatusCache, StatusCache},
    worker::{DetectionWorker, WorkerSettings},
};

const RATE_LIMIT_MESSAGE: &str = "请求过于频繁，请稍后再试";

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CardExchangeStore>,
    pub queue: Arc<dyn DedupQueue>,
    pub cache: Arc<dyn StatusCache>,
    pub worker: Arc<DetectionWorker>,
    pub visit_limiter: Arc<RateLimiter>,
    pub admin_limiter: Arc<RateLimiter>,
    pub status_cache_ttl: Duration,
    /// Whether this process owns the detection loop. When false a standalone
    /// worker binary drains the queue and handlers never start one here.
    pub embedded_worker: bool,
}

impl AppState {
    /// Wire the collaborators together. The worker is built here, once, and
    /// shared by handle with every handler.
    pub fn new(
        store: Arc<dyn CardExchangeStore>,
        queue: Arc<dyn DedupQueue>,
        cache: Arc<dyn StatusCache>,
        card_info: Arc<dyn CardInfoProvider>,
        settings: WorkerSettings,
        visit_limiter: RateLimiter,
        admin_limiter: RateLimiter,
    ) -> Self {
        let status_cache_ttl = settings.status_cache_ttl;
        let worker = Arc::new(DetectionWorker::new(
            queue.clone(),
            cache.clone(),
            store.clone(),
            card_info,
            settings,
        ));

        Self {
            store,
            queue,
            cache,
            worker,
            visit_limiter: Arc::new(visit_limiter),
            admin_limiter: Arc::new(admin_limiter),
            status_cache_ttl,
            embedded_worker: true,
        }
    }

    pub fn with_embedded_worker(mut self, embedded_worker: bool) -> Self {
        self.embedded_worker = embedded_worker;
        self
    }

    /// Build production state from configuration and a connected pool.
    ///
    /// Without a Redis URL the queue and status cache live in this process
    /// only.
    pub fn from_config(config: &AppConfig, pool: PgPool) -> Result<Self, StartupError> {
        let queue: Arc<dyn DedupQueue>;
        let cache: Arc<dyn StatusCache>;
        match &config.redis_url {
            Some(url) => {
                queue = Arc::new(RedisDedupQueue::new(url)?);
                cache = Arc::new(RedisStatusCache::new(url)?);
            }
            None => {
                tracing::warn!("REDIS_URL not set, using process-local queue and status cache");
                queue = Arc::new(InMemoryDedupQueue::new());
                cache = Arc::new(InMemoryStatusCache::new());
            }
        }

        let card_info = CardInfoClient::new(
            &config.card_info_base_url,
            &config.card_info_user_agent,
            config.card_info_timeout(),
        )?;

        let settings = WorkerSettings {
            poll_interval: config.poll_interval(),
            batch_size: config.batch_size,
            batch_delay: config.batch_delay(),
            status_cache_ttl: config.status_cache_ttl(),
        };

        let visit_limiter = RateLimiter::new(RateLimitConfig::new(
            config.visit_rate_limit_max,
            Duration::from_millis(config.visit_rate_limit_window_ms),
            RATE_LIMIT_MESSAGE,
        ));
        let admin_limiter = RateLimiter::new(RateLimitConfig::new(
            config.admin_rate_limit_max,
            Duration::from_millis(config.admin_rate_limit_window_ms),
            RATE_LIMIT_MESSAGE,
        ));

        Ok(Self::new(
            Arc::new(PgCardExchangeStore::new(pool)),
            queue,
            cache,
            Arc::new(card_info),
            settings,
            visit_limiter,
            admin_limiter,
        )
        .with_embedded_worker(config.embedded_worker))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to initialize detection queue: {0}")]
    Queue(#[from] QueueError),

    #[error("Failed to initialize status cache: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to initialize card-info client: {0}")]
    CardInfo(#[from] LookupError),
}
