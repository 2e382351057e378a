use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tokio::sync::Mutex;

const QUEUE_KEY: &str = "card_detect:queue";
const PENDING_KEY: &str = "card_detect:pending";

/// Adds the card id to the pending set and appends the payload in one step.
/// Returns 1 when the item was queued, 0 when the id was already pending.
const ENQUEUE_IF_ABSENT: &str = r#"
if redis.call('SADD', KEYS[2], ARGV[1]) == 1 then
    redis.call('RPUSH', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Pops the oldest payload and drops its card id from the pending set.
const DEQUEUE: &str = r#"
local payload = redis.call('LPOP', KEYS[1])
if not payload then
    return false
end
local item = cjson.decode(payload)
redis.call('SREM', KEYS[2], item['cardId'])
return payload
"#;

/// A pending detection job. Created on a qualifying visit and consumed
/// exactly once by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub card_id: String,
    pub share_token: String,
    pub original_url: Option<String>,
    pub visited_at: DateTime<Utc>,
    pub priority: i32,
}

impl QueueItem {
    pub fn new(card_id: impl Into<String>, share_token: impl Into<String>) -> Self {
        Self {
            card_id: card_id.into(),
            share_token: share_token.into(),
            original_url: None,
            visited_at: Utc::now(),
            priority: 0,
        }
    }
}

/// FIFO detection queue that holds at most one item per card id.
///
/// A card id leaves the pending set when its item is dequeued, not when
/// processing finishes, so a new visit may queue the card again while the
/// previous lookup is still in flight.
#[async_trait]
pub trait DedupQueue: Send + Sync {
    /// Queue the item unless its card is already pending. Returns whether it was added.
    async fn enqueue_if_absent(&self, item: &QueueItem) -> Result<bool, QueueError>;

    /// Pop the oldest item, releasing its card id.
    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError>;

    async fn length(&self) -> Result<u64, QueueError>;

    /// Size of the pending set.
    async fn pending_count(&self) -> Result<u64, QueueError>;

    /// Check backend connectivity (for health checks).
    async fn health_check(&self) -> Result<(), QueueError>;
}

/// Redis-backed dedup queue. Both mutations run as Lua scripts so the set
/// and the list change together.
pub struct RedisDedupQueue {
    client: redis::Client,
    enqueue_script: redis::Script,
    dequeue_script: redis::Script,
}

impl RedisDedupQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self {
            client,
            enqueue_script: redis::Script::new(ENQUEUE_IF_ABSENT),
            dequeue_script: redis::Script::new(DEQUEUE),
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }
}

#[async_trait]
impl DedupQueue for RedisDedupQueue {
    async fn enqueue_if_absent(&self, item: &QueueItem) -> Result<bool, QueueError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(item).map_err(QueueError::Serialize)?;
        let added: i64 = self
            .enqueue_script
            .key(QUEUE_KEY)
            .key(PENDING_KEY)
            .arg(&item.card_id)
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(added == 1)
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut conn = self.connection().await?;
        let result: Option<String> = self
            .dequeue_script
            .key(QUEUE_KEY)
            .key(PENDING_KEY)
            .invoke_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let item: QueueItem =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }

    async fn length(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = redis::cmd("LLEN")
            .arg(QUEUE_KEY)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn pending_count(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let pending: u64 = redis::cmd("SCARD")
            .arg(PENDING_KEY)
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(pending)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    items: VecDeque<QueueItem>,
    pending: HashSet<String>,
}

/// Process-local dedup queue, used when no Redis URL is configured.
/// Draining is then confined to this process.
#[derive(Debug, Default)]
pub struct InMemoryDedupQueue {
    state: Mutex<MemoryQueueState>,
}

impl InMemoryDedupQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DedupQueue for InMemoryDedupQueue {
    async fn enqueue_if_absent(&self, item: &QueueItem) -> Result<bool, QueueError> {
        let mut state = self.state.lock().await;
        if !state.pending.insert(item.card_id.clone()) {
            return Ok(false);
        }
        state.items.push_back(item.clone());
        Ok(true)
    }

    async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        let mut state = self.state.lock().await;
        let item = state.items.pop_front();
        if let Some(item) = &item {
            state.pending.remove(&item.card_id);
        }
        Ok(item)
    }

    async fn length(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().await.items.len() as u64)
    }

    async fn pending_count(&self) -> Result<u64, QueueError> {
        Ok(self.state.lock().await.pending.len() as u64)
    }

    async fn health_check(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_enqueue_of_same_card_is_rejected() {
        let queue = InMemoryDedupQueue::new();
        let item = QueueItem::new("card-1", "tok-1");

        assert!(queue.enqueue_if_absent(&item).await.unwrap());
        assert!(!queue.enqueue_if_absent(&item).await.unwrap());
        assert_eq!(queue.length().await.unwrap(), 1);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dequeue_is_fifo_and_releases_card() {
        let queue = InMemoryDedupQueue::new();
        queue.enqueue_if_absent(&QueueItem::new("a", "ta")).await.unwrap();
        queue.enqueue_if_absent(&QueueItem::new("b", "tb")).await.unwrap();

        let first = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(first.card_id, "a");
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        // "a" may be queued again once it has left the queue
        assert!(queue.enqueue_if_absent(&QueueItem::new("a", "ta")).await.unwrap());

        assert_eq!(queue.dequeue().await.unwrap().unwrap().card_id, "b");
        assert_eq!(queue.dequeue().await.unwrap().unwrap().card_id, "a");
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[test]
    fn test_payload_uses_field_names_read_by_dequeue_script() {
        let payload = serde_json::to_value(QueueItem::new("card-1", "tok-1")).unwrap();

        assert_eq!(payload["cardId"], "card-1");
        assert_eq!(payload["shareToken"], "tok-1");
        assert!(payload.get("card_id").is_none());
        assert!(DEQUEUE.contains("item['cardId']"));
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_keep_one_item_per_card() {
        let queue = Arc::new(InMemoryDedupQueue::new());
        let mut handles = Vec::new();
        for i in 0..200 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let card = format!("card-{}", i % 10);
                queue
                    .enqueue_if_absent(&QueueItem::new(card, "tok"))
                    .await
                    .unwrap()
            }));
        }

        let added = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(added, 10);
        assert_eq!(queue.length().await.unwrap(), 10);
        assert_eq!(queue.pending_count().await.unwrap(), 10);

        let mut seen = HashSet::new();
        while let Some(item) = queue.dequeue().await.unwrap() {
            assert!(seen.insert(item.card_id));
        }
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    /// Requires a running Redis instance at REDIS_URL.
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_redis_enqueue_is_deduplicated() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let queue = RedisDedupQueue::new(&url).expect("Failed to open Redis");
        while queue.dequeue().await.unwrap().is_some() {}

        let item = QueueItem::new("redis-card", "tok");
        assert!(queue.enqueue_if_absent(&item).await.unwrap());
        assert!(!queue.enqueue_if_absent(&item).await.unwrap());
        assert_eq!(queue.length().await.unwrap(), 1);
        assert_eq!(queue.pending_count().await.unwrap(), 1);

        let popped = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(popped, item);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }
}
