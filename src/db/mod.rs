use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

use crate::models::exchange::{CardExchange, ExchangeStatus};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

/// Authoritative store of card exchanges.
///
/// All writes are unconditional last-write-wins: status only moves from
/// active to a terminal state and re-applying a terminal status is harmless.
#[async_trait]
pub trait CardExchangeStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<CardExchange>, StoreError>;

    /// Stamp `last_checked_at`, and overwrite `status` when one is given.
    async fn record_check(
        &self,
        id: &str,
        status: Option<ExchangeStatus>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Active exchanges, least recently checked first.
    async fn find_many_active(&self, limit: i64) -> Result<Vec<CardExchange>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unrecognized exchange status in database: {0}")]
    InvalidStatus(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub mod queries;
