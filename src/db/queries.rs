use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use super::{CardExchangeStore, StoreError};
use crate::models::exchange::{CardExchange, ExchangeStatus};

/// PostgreSQL-backed exchange store.
#[derive(Clone)]
pub struct PgCardExchangeStore {
    pool: PgPool,
}

impl PgCardExchangeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn exchange_from_row(row: PgRow) -> Result<CardExchange, StoreError> {
    let status_str: String = row.try_get("status")?;
    let status =
        ExchangeStatus::from_str(&status_str).map_err(|_| StoreError::InvalidStatus(status_str))?;

    Ok(CardExchange {
        id: row.try_get("id")?,
        share_token: row.try_get("share_token")?,
        status,
        last_checked_at: row.try_get("last_checked_at")?,
    })
}

#[async_trait]
impl CardExchangeStore for PgCardExchangeStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<CardExchange>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, share_token, status, last_checked_at
            FROM card_exchanges
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(exchange_from_row).transpose()
    }

    async fn record_check(
        &self,
        id: &str,
        status: Option<ExchangeStatus>,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE card_exchanges
            SET status = COALESCE($1, status),
                last_checked_at = $2,
                updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(status.map(|s| s.as_ref().to_string()))
        .bind(checked_at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_many_active(&self, limit: i64) -> Result<Vec<CardExchange>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, share_token, status, last_checked_at
            FROM card_exchanges
            WHERE status = 'active'
            ORDER BY last_checked_at ASC NULLS FIRST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(exchange_from_row).collect()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
