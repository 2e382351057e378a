//! Mock implementations for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::db::{CardExchangeStore, StoreError};
use crate::models::exchange::{CardExchange, ExchangeStatus};
use crate::services::card_info::{CardInfoProvider, CardLookup, LookupError};
use crate::services::queue::{DedupQueue, QueueError, QueueItem};
use crate::services::status_cache::{CacheError, StatusCache};

/// In-memory exchange store that counts reads.
#[derive(Default)]
pub struct MockExchangeStore {
    storage: Mutex<HashMap<String, CardExchange>>,
    reads: AtomicUsize,
    should_fail: bool,
}

impl MockExchangeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, id: &str, share_token: &str, status: ExchangeStatus) {
        self.insert_checked(id, share_token, status, None);
    }

    pub fn insert_checked(
        &self,
        id: &str,
        share_token: &str,
        status: ExchangeStatus,
        last_checked_at: Option<DateTime<Utc>>,
    ) {
        self.storage.lock().unwrap().insert(
            id.to_string(),
            CardExchange {
                id: id.to_string(),
                share_token: share_token.to_string(),
                status,
                last_checked_at,
            },
        );
    }

    /// Direct view of a record, not counted as a read.
    pub fn get(&self, id: &str) -> Option<CardExchange> {
        self.storage.lock().unwrap().get(id).cloned()
    }

    /// Number of `find_by_id` calls served.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn check_should_fail(&self) -> Result<(), StoreError> {
        if self.should_fail {
            return Err(StoreError::Unavailable("Mock error".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CardExchangeStore for MockExchangeStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<CardExchange>, StoreError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.check_should_fail()?;
        Ok(self.storage.lock().unwrap().get(id).cloned())
    }

    async fn record_check(
        &self,
        id: &str,
        status: Option<ExchangeStatus>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.check_should_fail()?;
        let mut storage = self.storage.lock().unwrap();
        if let Some(exchange) = storage.get_mut(id) {
            if let Some(status) = status {
                exchange.status = status;
            }
            exchange.last_checked_at = Some(checked_at);
        }
        Ok(())
    }

    async fn find_many_active(&self, limit: i64) -> Result<Vec<CardExchange>, StoreError> {
        self.check_should_fail()?;
        let storage = self.storage.lock().unwrap();
        let mut items: Vec<CardExchange> = storage
            .values()
            .filter(|e| e.status == ExchangeStatus::Active)
            .cloned()
            .collect();
        // None sorts before Some, matching NULLS FIRST
        items.sort_by(|a, b| a.last_checked_at.cmp(&b.last_checked_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_should_fail()
    }
}

/// Card-info provider answering from a per-token script.
/// Unknown tokens fail with HTTP 500.
#[derive(Default)]
pub struct MockCardInfo {
    responses: Mutex<HashMap<String, VecDeque<MockLookup>>>,
    calls: AtomicUsize,
}

#[derive(Debug, Clone)]
pub enum MockLookup {
    Claimed,
    Available,
    Error,
}

impl MockCardInfo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue answers for a token; the last one repeats once the rest are used.
    pub fn respond(&self, share_token: &str, answers: &[MockLookup]) {
        self.responses
            .lock()
            .unwrap()
            .insert(share_token.to_string(), answers.iter().cloned().collect());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CardInfoProvider for MockCardInfo {
    async fn lookup(&self, share_token: &str) -> Result<CardLookup, LookupError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let answer = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(share_token) {
                Some(answers) if answers.len() > 1 => answers.pop_front(),
                Some(answers) => answers.front().cloned(),
                None => None,
            }
        };

        match answer {
            Some(MockLookup::Claimed) => Ok(CardLookup::Claimed),
            Some(MockLookup::Available) => Ok(CardLookup::Available(
                crate::services::card_info::CardDetails {
                    action_type: "exchange".to_string(),
                    initiator_account: "mock".to_string(),
                    initiator_card_id: "1".to_string(),
                    accept_card_id: "2".to_string(),
                },
            )),
            Some(MockLookup::Error) | None => Err(LookupError::HttpStatus(500)),
        }
    }
}

/// Dedup queue whose every operation fails, as if Redis were down.
#[derive(Default)]
pub struct UnavailableQueue;

#[async_trait]
impl DedupQueue for UnavailableQueue {
    async fn enqueue_if_absent(&self, _item: &QueueItem) -> Result<bool, QueueError> {
        Err(QueueError::Unavailable("connection refused".to_string()))
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        Err(QueueError::Unavailable("connection refused".to_string()))
    }

    async fn length(&self) -> Result<u64, QueueError> {
        Err(QueueError::Unavailable("connection refused".to_string()))
    }

    async fn pending_count(&self) -> Result<u64, QueueError> {
        Err(QueueError::Unavailable("connection refused".to_string()))
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Err(QueueError::Unavailable("connection refused".to_string()))
    }
}

/// Status cache whose every operation fails.
#[derive(Default)]
pub struct UnavailableCache;

#[async_trait]
impl StatusCache for UnavailableCache {
    async fn get(&self, _card_id: &str) -> Result<Option<ExchangeStatus>, CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }

    async fn set(
        &self,
        _card_id: &str,
        _status: ExchangeStatus,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".to_string()))
    }
}
