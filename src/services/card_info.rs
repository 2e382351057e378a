//! Card-info provider client
//!
//! Looks up the live state of a shared card by its share token. The provider
//! reports "already taken" through a mix of null payloads and error codes;
//! this client folds all of them into [`CardLookup::Claimed`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provider code for a share that has already been exchanged.
pub const CODE_ALREADY_EXCHANGED: i64 = 41604;

/// Provider code for share info that no longer resolves to a card.
pub const CODE_MALFORMED_SHARE: i64 = 41605;

/// Provider messages meaning the card is gone rather than the call failed.
const CLAIMED_MESSAGES: &[&str] = &["已被兑换", "已被领取", "分享信息有误", "分享信息错误"];

/// Details of a card that is still available.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardDetails {
    pub action_type: String,
    pub initiator_account: String,
    pub initiator_card_id: String,
    pub accept_card_id: String,
}

/// Normalized result of a lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum CardLookup {
    Claimed,
    Available(CardDetails),
}

/// Source of live card state. The worker depends on this rather than on the
/// HTTP client directly.
#[async_trait]
pub trait CardInfoProvider: Send + Sync {
    async fn lookup(&self, share_token: &str) -> Result<CardLookup, LookupError>;
}

#[derive(Deserialize)]
struct ShareInfoResponse {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<ShareInfoData>,
}

#[derive(Deserialize)]
struct ShareInfoData {
    #[serde(default)]
    action_type: String,
    #[serde(default)]
    action_initator_accountname: String,
    #[serde(default, deserialize_with = "string_or_number")]
    action_initator_card_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    action_acceptcard_id: String,
}

/// The provider sends card ids as either strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// HTTP client for the provider's lookup-by-token endpoint.
pub struct CardInfoClient {
    http: reqwest::Client,
    base_url: String,
}

impl CardInfoClient {
    /// Every request carries `user_agent` and is bounded by `timeout`.
    pub fn new(
        base_url: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, LookupError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CardInfoProvider for CardInfoClient {
    async fn lookup(&self, share_token: &str) -> Result<CardLookup, LookupError> {
        let url = format!("{}/share/info", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("share_token", share_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::HttpStatus(status.as_u16()));
        }

        let body: ShareInfoResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Schema(e.to_string()))?;

        interpret(body)
    }
}

fn interpret(body: ShareInfoResponse) -> Result<CardLookup, LookupError> {
    if body.code != 0 {
        let message = body.message.unwrap_or_default();
        if is_claimed_signal(body.code, &message) {
            return Ok(CardLookup::Claimed);
        }
        return Err(LookupError::Provider {
            code: body.code,
            message,
        });
    }

    match body.data {
        None => Ok(CardLookup::Claimed),
        Some(data) => Ok(CardLookup::Available(CardDetails {
            action_type: data.action_type,
            initiator_account: data.action_initator_accountname,
            initiator_card_id: data.action_initator_card_id,
            accept_card_id: data.action_acceptcard_id,
        })),
    }
}

fn is_claimed_signal(code: i64, message: &str) -> bool {
    code == CODE_ALREADY_EXCHANGED
        || code == CODE_MALFORMED_SHARE
        || CLAIMED_MESSAGES.iter().any(|m| message.contains(m))
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("HTTP request to card-info provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Card-info provider returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Card-info provider error {code}: {message}")]
    Provider { code: i64, message: String },

    #[error("Unexpected card-info response: {0}")]
    Schema(String),
}
