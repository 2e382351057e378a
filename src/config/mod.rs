use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the detection queue and status cache.
    /// When unset both fall back to process-local memory.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Base URL of the card-info provider
    #[serde(default = "default_card_info_base_url")]
    pub card_info_base_url: String,

    /// User-Agent sent with every provider lookup
    #[serde(default = "default_card_info_user_agent")]
    pub card_info_user_agent: String,

    #[serde(default = "default_card_info_timeout_secs")]
    pub card_info_timeout_secs: u64,

    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,

    /// Maximum cards pulled by one admin batch check
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Pause between cards in the admin batch path
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    #[serde(default = "default_status_cache_ttl_secs")]
    pub status_cache_ttl_secs: u64,

    #[serde(default = "default_visit_rate_limit_max")]
    pub visit_rate_limit_max: u32,

    #[serde(default = "default_rate_limit_window_ms")]
    pub visit_rate_limit_window_ms: u64,

    #[serde(default = "default_admin_rate_limit_max")]
    pub admin_rate_limit_max: u32,

    #[serde(default = "default_rate_limit_window_ms")]
    pub admin_rate_limit_window_ms: u64,

    /// How often expired rate-limit records are swept
    #[serde(default = "default_rate_limit_sweep_secs")]
    pub rate_limit_sweep_secs: u64,

    /// Run the detection worker inside the HTTP server process
    #[serde(default = "default_embedded_worker")]
    pub embedded_worker: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_card_info_base_url() -> String {
    "https://api.cardshare.example.com/v1".to_string()
}

fn default_card_info_user_agent() -> String {
    "Mozilla/5.0 (compatible; CardStatusDetect/1.0)".to_string()
}

fn default_card_info_timeout_secs() -> u64 {
    10
}

fn default_worker_poll_interval_ms() -> u64 {
    5000
}

fn default_batch_size() -> i64 {
    50
}

fn default_batch_delay_ms() -> u64 {
    100
}

fn default_status_cache_ttl_secs() -> u64 {
    300
}

fn default_visit_rate_limit_max() -> u32 {
    30
}

fn default_admin_rate_limit_max() -> u32 {
    5
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_sweep_secs() -> u64 {
    300
}

fn default_embedded_worker() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn status_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.status_cache_ttl_secs)
    }

    pub fn card_info_timeout(&self) -> Duration {
        Duration::from_secs(self.card_info_timeout_secs)
    }
}
