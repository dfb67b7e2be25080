use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::entities::{batch_entity, prize_entity, token_entity};

/// 单个奖品的生成请求
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PrizeRequest {
    pub prize_id: i64,
    /// 历史遗留的手动数量；自动模式下仅记录，实际数量始终等于当前全部库存
    pub count: Option<i64>,
    /// 过期天数（缺省时使用 options.default_expiration_days）
    pub expiration_days: Option<i64>,
}

/// 生成选项
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct GenerateOptions {
    /// 批次描述，可包含营业日（DD.MM.YYYY / DDMMYYYY / DD.MM.YY）
    pub description: Option<String>,
    pub default_expiration_days: Option<i64>,
    /// 激活延迟（分钟），设置 token.available_from
    pub activation_delay_minutes: Option<i64>,
    /// 以禁用状态发放（预激活窗口）
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GenerateBatchRequest {
    pub prizes: Vec<PrizeRequest>,
    #[serde(default)]
    pub options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchResponse {
    pub id: i64,
    pub description: Option<String>,
    pub functional_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl From<batch_entity::Model> for BatchResponse {
    fn from(m: batch_entity::Model) -> Self {
        BatchResponse {
            id: m.id,
            description: m.description,
            functional_date: m.functional_date,
            created_at: m.created_at,
        }
    }
}

/// 生成结果中的 token（冗余奖品 key/label/color，供导出使用）
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GeneratedToken {
    pub id: String,
    pub batch_id: i64,
    pub prize_id: i64,
    pub prize_key: String,
    pub prize_label: String,
    pub prize_color: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub available_from: Option<DateTime<Utc>>,
    pub disabled: bool,
    pub signature: String,
    pub signature_version: i16,
}

impl GeneratedToken {
    pub fn new(token: &token_entity::Model, prize: &prize_entity::Model) -> Self {
        GeneratedToken {
            id: token.id.clone(),
            batch_id: token.batch_id,
            prize_id: prize.id,
            prize_key: prize.key.clone(),
            prize_label: prize.label.clone(),
            prize_color: prize.color.clone(),
            expires_at: token.expires_at,
            available_from: token.available_from,
            disabled: token.disabled,
            signature: token.signature.clone(),
            signature_version: token.signature_version,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerateMeta {
    /// 生成模式，目前只支持 "auto"（消耗全部库存）
    pub mode: String,
    pub requested_prizes: usize,
    pub emitted_prizes: usize,
    /// 库存为 0、不受管理或未启用而跳过的奖品
    pub skipped_prize_ids: Vec<i64>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GenerateResponse {
    pub batch: BatchResponse,
    pub tokens: Vec<GeneratedToken>,
    pub meta: GenerateMeta,
    /// prize_id -> 本次发放数量
    pub emitted_totals: BTreeMap<i64, i64>,
}
