use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::{PrizeKind, TokenState, prize_entity, token_entity};

/// reveal 后展示给持有人的奖品
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevealedPrize {
    pub id: i64,
    pub key: String,
    pub label: String,
    pub color: Option<String>,
    pub kind: PrizeKind,
}

impl From<prize_entity::Model> for RevealedPrize {
    fn from(m: prize_entity::Model) -> Self {
        RevealedPrize {
            id: m.id,
            key: m.key,
            label: m.label,
            color: m.color,
            kind: m.kind,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RevealResponse {
    pub token_id: String,
    pub prize: RevealedPrize,
    pub revealed_at: DateTime<Utc>,
    /// 重复 reveal 时为 true（返回原有结果，不重新打时间戳）
    pub already_revealed: bool,
}

/// deliver / redeem 的时间戳结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RedemptionTimestamps {
    pub token_id: String,
    pub revealed_at: DateTime<Utc>,
    pub delivered_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenStatusResponse {
    pub token_id: String,
    pub prize_id: i64,
    pub batch_id: i64,
    pub state: TokenState,
    pub signature_valid: bool,
    pub disabled: bool,
    pub expires_at: DateTime<Utc>,
    pub available_from: Option<DateTime<Utc>>,
    pub revealed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub paired_next_token_id: Option<String>,
}

impl TokenStatusResponse {
    pub fn new(m: token_entity::Model, signature_valid: bool, now: DateTime<Utc>) -> Self {
        TokenStatusResponse {
            state: m.state(now),
            revealed_at: m.effective_revealed_at(),
            delivered_at: m.effective_delivered_at(),
            token_id: m.id,
            prize_id: m.prize_id,
            batch_id: m.batch_id,
            signature_valid,
            disabled: m.disabled,
            expires_at: m.expires_at,
            available_from: m.available_from,
            redeemed_at: m.redeemed_at,
            paired_next_token_id: m.paired_next_token_id,
        }
    }
}

/// 建立“再来一次” token 与下一张 token 的链接
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct LinkPairRequest {
    pub retry_token_id: String,
    pub next_token_id: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepResponse {
    pub disabled_count: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BackfillResponse {
    pub updated: u64,
}
