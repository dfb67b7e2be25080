use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct RecordArrivalRequest {
    /// 到场时间（缺省为当前时间）
    pub arrived_at: Option<DateTime<Utc>>,
}

/// 过期时间重算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ExpirationUpdate {
    pub reservation_id: i64,
    pub new_expires_at: DateTime<Utc>,
    pub tokens_updated: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecalculateResponse {
    pub reservation_id: i64,
    /// 到场事件尚未发生时为 false，不做任何修改
    pub applied: bool,
    pub new_expires_at: Option<DateTime<Utc>>,
    pub tokens_updated: u64,
}

impl RecalculateResponse {
    pub fn new(reservation_id: i64, update: Option<ExpirationUpdate>) -> Self {
        match update {
            Some(u) => RecalculateResponse {
                reservation_id,
                applied: true,
                new_expires_at: Some(u.new_expires_at),
                tokens_updated: u.tokens_updated,
            },
            None => RecalculateResponse {
                reservation_id,
                applied: false,
                new_expires_at: None,
                tokens_updated: 0,
            },
        }
    }
}
