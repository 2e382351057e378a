//! Test helper utilities for E2E testing

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Response from POST /api/exchanges/{id}/visit
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitResponse {
    pub success: bool,
    pub status: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub length: u64,
    pub pending_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub is_running: bool,
    pub retry_count: u64,
    pub poll_interval: u64,
}

/// Response from GET /api/queue/status
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub queue: QueueStats,
    pub worker: WorkerStatus,
    pub timestamp: String,
}

/// Record a visit with a browser User-Agent
pub async fn record_visit(
    client: &reqwest::Client,
    base_url: &str,
    exchange_id: &str,
) -> Result<VisitResponse, Box<dyn std::error::Error>> {
    let response = client
        .post(format!("{}/api/exchanges/{}/visit", base_url, exchange_id))
        .header(
            "user-agent",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15",
        )
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("Visit failed with status {}: {}", status, error_text).into());
    }

    Ok(response.json::<VisitResponse>().await?)
}

pub async fn queue_status(
    client: &reqwest::Client,
    base_url: &str,
) -> Result<QueueStatusResponse, Box<dyn std::error::Error>> {
    let response = client
        .get(format!("{}/api/queue/status", base_url))
        .send()
        .await?;
    Ok(response.json::<QueueStatusResponse>().await?)
}

/// Poll queue status until the queue is drained (with timeout)
pub async fn wait_for_empty_queue(
    client: &reqwest::Client,
    base_url: &str,
    timeout_secs: u64,
) -> Result<QueueStatusResponse, Box<dyn std::error::Error>> {
    let max_attempts = timeout_secs * 2; // Poll every 500ms

    for attempt in 0..max_attempts {
        let status = queue_status(client, base_url).await?;
        if status.queue.length == 0 {
            return Ok(status);
        }
        if attempt % 10 == 0 && attempt > 0 {
            println!("  ... still waiting (attempt {}/{})", attempt, max_attempts);
        }
        sleep(Duration::from_millis(500)).await;
    }

    Err(format!("Queue did not drain within {} seconds", timeout_secs).into())
}
