use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Lifecycle state of a card exchange.
///
/// Only `Active` cards are eligible for detection. Every other status is
/// terminal as far as the detection pipeline is concerned: the worker never
/// moves a card back to `Active`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, EnumString, Display, AsRefStr, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExchangeStatus {
    Active,
    Claimed,
    Expired,
    Invalid,
}

impl ExchangeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExchangeStatus::Active)
    }

    /// Message shown to a visitor landing on a card in this state.
    pub fn visitor_message(self) -> &'static str {
        match self {
            ExchangeStatus::Active => "卡片可用",
            ExchangeStatus::Claimed => "卡片已被消费",
            ExchangeStatus::Expired => "卡片已过期",
            ExchangeStatus::Invalid => "卡片无效",
        }
    }
}

/// A user-submitted card exchange. The detection pipeline reads the whole
/// record but only ever writes `status` and `last_checked_at`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardExchange {
    pub id: String,
    pub share_token: String,
    pub status: ExchangeStatus,
    pub last_checked_at: Option<DateTime<Utc>>,
}
