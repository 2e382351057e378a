use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::exchange::ExchangeStatus;

/// Optional body of a visit request.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VisitRequest {
    #[garde(length(min = 1, max = 2048))]
    pub original_url: Option<String>,
}

/// Response after recording a visit.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VisitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExchangeStatus>,
    pub message: String,
}

/// Response of a synchronous single-card check.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    pub id: String,
    pub status: ExchangeStatus,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Totals for one admin batch check.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub checked: u32,
    pub claimed: u32,
    pub available: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub length: u64,
    pub pending_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub is_running: bool,
    pub retry_count: u64,
    /// Poll interval in milliseconds
    pub poll_interval: u64,
}

/// Operational view of the detection queue and worker.
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub queue: QueueStats,
    pub worker: WorkerStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
