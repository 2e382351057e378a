use async_trait::async_trait;
use dashmap::DashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::models::exchange::ExchangeStatus;

const KEY_PREFIX: &str = "card_detect:status:";

/// Short-lived cache of terminal card statuses.
///
/// `Active` is never stored: it is the one status that can change without
/// the pipeline seeing the transition.
#[async_trait]
pub trait StatusCache: Send + Sync {
    async fn get(&self, card_id: &str) -> Result<Option<ExchangeStatus>, CacheError>;

    /// Store a terminal status. Active statuses are ignored.
    async fn set(
        &self,
        card_id: &str,
        status: ExchangeStatus,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

pub struct RedisStatusCache {
    client: redis::Client,
}

impl RedisStatusCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(CacheError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatusCache for RedisStatusCache {
    async fn get(&self, card_id: &str) -> Result<Option<ExchangeStatus>, CacheError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;
        let raw: Option<String> = redis::cmd("GET")
            .arg(format!("{KEY_PREFIX}{card_id}"))
            .query_async(&mut conn)
            .await
            .map_err(CacheError::Redis)?;

        match raw {
            Some(s) => {
                let status =
                    ExchangeStatus::from_str(&s).map_err(|_| CacheError::Corrupt(s.clone()))?;
                Ok(Some(status).filter(|s| s.is_terminal()))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        card_id: &str,
        status: ExchangeStatus,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if !status.is_terminal() {
            return Ok(());
        }
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(CacheError::Redis)?;
        redis::cmd("SET")
            .arg(format!("{KEY_PREFIX}{card_id}"))
            .arg(status.as_ref())
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await
            .map_err(CacheError::Redis)?;
        Ok(())
    }
}

/// Process-local status cache with per-entry expiry.
#[derive(Debug, Default)]
pub struct InMemoryStatusCache {
    entries: DashMap<String, (ExchangeStatus, Instant)>,
}

impl InMemoryStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup as of `now`; expired entries are dropped on read.
    pub fn get_at(&self, card_id: &str, now: Instant) -> Option<ExchangeStatus> {
        // Expiry check and removal happen under one shard lock so a concurrent
        // set_at is never the entry being dropped.
        if self
            .entries
            .remove_if(card_id, |_, (_, expires_at)| now >= *expires_at)
            .is_some()
        {
            return None;
        }
        self.entries
            .get(card_id)
            .map(|entry| *entry)
            .filter(|(_, expires_at)| now < *expires_at)
            .map(|(status, _)| status)
    }

    pub fn set_at(&self, card_id: &str, status: ExchangeStatus, ttl: Duration, now: Instant) {
        if status.is_terminal() {
            self.entries.insert(card_id.to_string(), (status, now + ttl));
        }
    }
}

#[async_trait]
impl StatusCache for InMemoryStatusCache {
    async fn get(&self, card_id: &str) -> Result<Option<ExchangeStatus>, CacheError> {
        Ok(self.get_at(card_id, Instant::now()))
    }

    async fn set(
        &self,
        card_id: &str,
        status: ExchangeStatus,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_at(card_id, status, ttl, Instant::now());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Unrecognized cached status: {0}")]
    Corrupt(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}
