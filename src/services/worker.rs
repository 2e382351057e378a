//! Background detection worker
//!
//! One `DetectionWorker` is built per process at startup and shared by
//! handle. It drains the dedup queue on a polling loop and also serves the
//! admin batch path and single-card checks. Queue draining is per process;
//! several processes pointed at one Redis queue compete for items.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::db::{CardExchangeStore, StoreError};
use crate::models::exchange::{CardExchange, ExchangeStatus};
use crate::models::visit::{BatchSummary, WorkerStatus};
use crate::services::best_effort::best_effort;
use crate::services::card_info::{CardInfoProvider, CardLookup, LookupError};
use crate::services::queue::{DedupQueue, QueueError};
use crate::services::status_cache::StatusCache;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub batch_delay: Duration,
    pub status_cache_ttl: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            batch_size: 50,
            batch_delay: Duration::from_millis(100),
            status_cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Result of one detection attempt for one card.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Claimed,
    Available,
    Failed(String),
}

impl CheckOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CheckOutcome::Claimed => "claimed",
            CheckOutcome::Available => "available",
            CheckOutcome::Failed(_) => "error",
        }
    }
}

pub struct DetectionWorker {
    queue: Arc<dyn DedupQueue>,
    cache: Arc<dyn StatusCache>,
    store: Arc<dyn CardExchangeStore>,
    card_info: Arc<dyn CardInfoProvider>,
    settings: WorkerSettings,
    running: AtomicBool,
    retry_count: AtomicU64,
}

impl DetectionWorker {
    pub fn new(
        queue: Arc<dyn DedupQueue>,
        cache: Arc<dyn StatusCache>,
        store: Arc<dyn CardExchangeStore>,
        card_info: Arc<dyn CardInfoProvider>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            cache,
            store,
            card_info,
            settings,
            running: AtomicBool::new(false),
            retry_count: AtomicU64::new(0),
        }
    }

    /// Start the polling loop on the tokio runtime. Returns `false` when the
    /// loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Starting detection worker"
        );

        let worker = Arc::clone(self);
        tokio::spawn(async move { worker.run().await });
        true
    }

    /// Poll until the process exits.
    async fn run(&self) {
        loop {
            match self.process_next().await {
                Ok(true) => {
                    tracing::debug!("Item processed, checking for next item");
                }
                Ok(false) => {
                    tracing::trace!("Detection queue empty, sleeping");
                    sleep(self.settings.poll_interval).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to dequeue detection item, will retry");
                    sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// Handle the next queued item.
    /// Returns Ok(true) if an item was processed, Ok(false) if the queue was empty.
    pub async fn process_next(&self) -> Result<bool, QueueError> {
        let item = match self.queue.dequeue().await? {
            Some(item) => item,
            None => return Ok(false),
        };

        if let Some(depth) = best_effort("queue_length", self.queue.length()).await {
            metrics::gauge!("detection_queue_depth").set(depth as f64);
        }

        tracing::info!(
            card_id = %item.card_id,
            visited_at = %item.visited_at,
            "Processing detection item"
        );

        self.check_card(&item.card_id, &item.share_token).await;
        Ok(true)
    }

    /// Look up one card and write the result back. Never fails: provider
    /// errors are counted and `last_checked_at` advances either way.
    pub async fn check_card(&self, card_id: &str, share_token: &str) -> CheckOutcome {
        let start = Instant::now();
        let lookup = self.card_info.lookup(share_token).await;
        metrics::histogram!("card_lookup_seconds").record(start.elapsed().as_secs_f64());

        let now = Utc::now();
        let (outcome, new_status) = match lookup {
            Ok(CardLookup::Claimed) => (CheckOutcome::Claimed, Some(ExchangeStatus::Claimed)),
            Ok(CardLookup::Available(details)) => {
                tracing::debug!(
                    card_id,
                    action_type = %details.action_type,
                    initiator = %details.initiator_account,
                    "Card still available"
                );
                (CheckOutcome::Available, None)
            }
            Err(e) => {
                self.retry_count.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(card_id, error = %e, "Card lookup failed, dropping item");
                (e.into(), None)
            }
        };

        metrics::counter!("card_lookups_total", "outcome" => outcome.label()).increment(1);

        if let Err(e) = self.store.record_check(card_id, new_status, now).await {
            tracing::error!(card_id, error = %e, "Failed to record detection result");
        }

        if let Some(status) = new_status {
            best_effort(
                "status_cache_set",
                self.cache.set(card_id, status, self.settings.status_cache_ttl),
            )
            .await;
            tracing::info!(card_id, status = %status, "Card marked terminal");
        }

        outcome
    }

    /// Check up to `batch_size` active exchanges straight from the store,
    /// least recently checked first, pausing between cards.
    pub async fn run_batch(&self) -> Result<BatchSummary, StoreError> {
        let exchanges = self.store.find_many_active(self.settings.batch_size).await?;
        tracing::info!(count = exchanges.len(), "Starting batch status check");

        let mut summary = BatchSummary::default();
        for (idx, exchange) in exchanges.iter().enumerate() {
            if idx > 0 {
                sleep(self.settings.batch_delay).await;
            }
            summary.checked += 1;
            match self.check_card(&exchange.id, &exchange.share_token).await {
                CheckOutcome::Claimed => summary.claimed += 1,
                CheckOutcome::Available => summary.available += 1,
                CheckOutcome::Failed(_) => summary.failed += 1,
            }
        }

        tracing::info!(
            checked = summary.checked,
            claimed = summary.claimed,
            failed = summary.failed,
            "Batch status check complete"
        );
        Ok(summary)
    }

    /// Check one exchange now. Terminal exchanges are returned untouched.
    pub async fn check_exchange(
        &self,
        exchange: &CardExchange,
    ) -> (ExchangeStatus, Option<CheckOutcome>) {
        if exchange.status.is_terminal() {
            return (exchange.status, None);
        }
        let outcome = self.check_card(&exchange.id, &exchange.share_token).await;
        let status = match outcome {
            CheckOutcome::Claimed => ExchangeStatus::Claimed,
            _ => exchange.status,
        };
        (status, Some(outcome))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Failed lookups since the worker was created.
    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval
    }

    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            is_running: self.is_running(),
            retry_count: self.retry_count(),
            poll_interval: self.settings.poll_interval.as_millis() as u64,
        }
    }
}

impl From<LookupError> for CheckOutcome {
    fn from(e: LookupError) -> Self {
        CheckOutcome::Failed(e.to_string())
    }
}
