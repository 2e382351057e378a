//! Detection worker behavior against in-memory collaborators.

use card_status_detect::{
    models::exchange::ExchangeStatus,
    services::{
        queue::{DedupQueue, InMemoryDedupQueue, QueueItem},
        status_cache::{InMemoryStatusCache, StatusCache},
        worker::{CheckOutcome, DetectionWorker, WorkerSettings},
    },
    test_utils::{MockCardInfo, MockExchangeStore, MockLookup, UnavailableCache, UnavailableQueue},
};
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    queue: Arc<InMemoryDedupQueue>,
    cache: Arc<InMemoryStatusCache>,
    store: Arc<MockExchangeStore>,
    card_info: Arc<MockCardInfo>,
    worker: Arc<DetectionWorker>,
}

fn settings() -> WorkerSettings {
    WorkerSettings {
        poll_interval: Duration::from_millis(20),
        batch_size: 50,
        batch_delay: Duration::from_millis(1),
        status_cache_ttl: Duration::from_secs(300),
    }
}

fn harness() -> Harness {
    let queue = Arc::new(InMemoryDedupQueue::new());
    let cache = Arc::new(InMemoryStatusCache::new());
    let store = Arc::new(MockExchangeStore::new());
    let card_info = Arc::new(MockCardInfo::new());
    let worker = Arc::new(DetectionWorker::new(
        queue.clone(),
        cache.clone(),
        store.clone(),
        card_info.clone(),
        settings(),
    ));
    Harness {
        queue,
        cache,
        store,
        card_info,
        worker,
    }
}

#[tokio::test]
async fn test_claimed_lookup_marks_card_and_caches_status() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Active);
    h.card_info.respond("tok-1", &[MockLookup::Claimed]);
    h.queue
        .enqueue_if_absent(&QueueItem::new("card-1", "tok-1"))
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    let exchange = h.store.get("card-1").unwrap();
    assert_eq!(exchange.status, ExchangeStatus::Claimed);
    assert!(exchange.last_checked_at.is_some());
    assert_eq!(h.cache.get("card-1").await.unwrap(), Some(ExchangeStatus::Claimed));
    assert_eq!(h.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_available_lookup_only_advances_checked_at() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Active);
    h.card_info.respond("tok-1", &[MockLookup::Available]);

    let outcome = h.worker.check_card("card-1", "tok-1").await;

    assert_eq!(outcome, CheckOutcome::Available);
    let exchange = h.store.get("card-1").unwrap();
    assert_eq!(exchange.status, ExchangeStatus::Active);
    assert!(exchange.last_checked_at.is_some());
    assert!(h.cache.get("card-1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_lookup_counts_retry_and_drops_item() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Active);
    h.card_info.respond("tok-1", &[MockLookup::Error]);
    h.queue
        .enqueue_if_absent(&QueueItem::new("card-1", "tok-1"))
        .await
        .unwrap();

    assert!(h.worker.process_next().await.unwrap());

    assert_eq!(h.worker.retry_count(), 1);
    let exchange = h.store.get("card-1").unwrap();
    assert_eq!(exchange.status, ExchangeStatus::Active);
    assert!(exchange.last_checked_at.is_some());
    // Not re-enqueued
    assert_eq!(h.queue.length().await.unwrap(), 0);
    assert!(!h.worker.process_next().await.unwrap());
}

#[tokio::test]
async fn test_claimed_update_is_idempotent() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Active);
    h.card_info.respond("tok-1", &[MockLookup::Claimed]);

    assert_eq!(h.worker.check_card("card-1", "tok-1").await, CheckOutcome::Claimed);
    let first = h.store.get("card-1").unwrap().last_checked_at.unwrap();

    assert_eq!(h.worker.check_card("card-1", "tok-1").await, CheckOutcome::Claimed);
    let exchange = h.store.get("card-1").unwrap();
    assert_eq!(exchange.status, ExchangeStatus::Claimed);
    assert!(exchange.last_checked_at.unwrap() >= first);
    assert_eq!(h.worker.retry_count(), 0);
}

#[tokio::test]
async fn test_batch_checks_oldest_active_first() {
    let h = harness();
    let now = Utc::now();
    h.store
        .insert_checked("recent", "tok-r", ExchangeStatus::Active, Some(now));
    h.store.insert_checked(
        "stale",
        "tok-s",
        ExchangeStatus::Active,
        Some(now - ChronoDuration::hours(3)),
    );
    h.store.insert("never", "tok-n", ExchangeStatus::Active);
    h.store.insert("gone", "tok-g", ExchangeStatus::Expired);

    h.card_info.respond("tok-r", &[MockLookup::Available]);
    h.card_info.respond("tok-s", &[MockLookup::Claimed]);
    h.card_info.respond("tok-n", &[MockLookup::Error]);

    let summary = h.worker.run_batch().await.unwrap();

    assert_eq!(summary.checked, 3);
    assert_eq!(summary.claimed, 1);
    assert_eq!(summary.available, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(h.card_info.calls(), 3);
    assert_eq!(h.store.get("stale").unwrap().status, ExchangeStatus::Claimed);
    assert_eq!(h.store.get("gone").unwrap().status, ExchangeStatus::Expired);
    assert!(h.store.get("gone").unwrap().last_checked_at.is_none());
}

#[tokio::test]
async fn test_batch_respects_batch_size() {
    let queue = Arc::new(InMemoryDedupQueue::new());
    let store = Arc::new(MockExchangeStore::new());
    let card_info = Arc::new(MockCardInfo::new());
    for i in 0..5 {
        store.insert(&format!("card-{i}"), &format!("tok-{i}"), ExchangeStatus::Active);
        card_info.respond(&format!("tok-{i}"), &[MockLookup::Available]);
    }
    let worker = DetectionWorker::new(
        queue,
        Arc::new(InMemoryStatusCache::new()),
        store,
        card_info.clone(),
        WorkerSettings {
            batch_size: 2,
            ..settings()
        },
    );

    let summary = worker.run_batch().await.unwrap();
    assert_eq!(summary.checked, 2);
    assert_eq!(card_info.calls(), 2);
}

#[tokio::test]
async fn test_check_exchange_skips_terminal_cards() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Invalid);
    let exchange = h.store.get("card-1").unwrap();

    let (status, outcome) = h.worker.check_exchange(&exchange).await;

    assert_eq!(status, ExchangeStatus::Invalid);
    assert!(outcome.is_none());
    assert_eq!(h.card_info.calls(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent_and_drains_queue() {
    let h = harness();
    h.store.insert("card-1", "tok-1", ExchangeStatus::Active);
    h.card_info.respond("tok-1", &[MockLookup::Claimed]);

    assert!(!h.worker.is_running());
    assert!(h.worker.start());
    assert!(!h.worker.start());
    assert!(h.worker.is_running());

    h.queue
        .enqueue_if_absent(&QueueItem::new("card-1", "tok-1"))
        .await
        .unwrap();

    let mut claimed = false;
    for _ in 0..100 {
        if h.store.get("card-1").unwrap().status == ExchangeStatus::Claimed {
            claimed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(claimed, "worker did not drain the queue");

    let status = h.worker.status();
    assert!(status.is_running);
    assert_eq!(status.poll_interval, 20);
}

#[tokio::test]
async fn test_unavailable_cache_does_not_block_claimed_write() {
    let store = Arc::new(MockExchangeStore::new());
    let card_info = Arc::new(MockCardInfo::new());
    store.insert("card-1", "tok-1", ExchangeStatus::Active);
    card_info.respond("tok-1", &[MockLookup::Claimed]);
    let worker = DetectionWorker::new(
        Arc::new(UnavailableQueue),
        Arc::new(UnavailableCache),
        store.clone(),
        card_info,
        settings(),
    );

    assert_eq!(worker.check_card("card-1", "tok-1").await, CheckOutcome::Claimed);
    assert_eq!(store.get("card-1").unwrap().status, ExchangeStatus::Claimed);
    // Dequeue failures surface to the loop, which logs and sleeps
    assert!(worker.process_next().await.is_err());
}
