use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 兑换 token
/// 说明:
/// - id 为随机不透明字符串，同时也是持有人凭证
/// - signature 在发放时基于 (id, prize_id, signed_expires_at) 计算，之后不再重算
/// - expires_at 为当前生效的过期时间，可能被到场事件重算；signed_expires_at 固定为发放时的值
/// - revealed_at / delivered_at / redeemed_at 各自最多写入一次，不会清空
/// - redeemed_at 为旧版一阶段兑换字段，保留给外部报表读取
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub prize_id: i64,
    pub batch_id: i64,
    pub expires_at: DateTime<Utc>,
    pub signed_expires_at: DateTime<Utc>,
    pub signature: String,
    pub signature_version: i16,
    pub disabled: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub revealed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub assigned_prize_id: Option<i64>,
    pub paired_next_token_id: Option<String>,
    pub reservation_id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// token 派生状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Issued,
    Revealed,
    Delivered,
    /// 旧版一阶段兑换（视为 revealed = delivered = redeemed_at）
    Redeemed,
    Expired,
    Disabled,
}

impl Model {
    /// 旧数据只有 redeemed_at 时，视为在同一时刻 reveal
    pub fn effective_revealed_at(&self) -> Option<DateTime<Utc>> {
        self.revealed_at.or(self.redeemed_at)
    }

    pub fn effective_delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at.or(self.redeemed_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.available_from.is_none_or(|from| now >= from)
    }

    /// 仍可被 reveal 的 token（未禁用、未揭晓、未过期）
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.disabled && self.effective_revealed_at().is_none() && !self.is_expired(now)
    }

    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.disabled {
            TokenState::Disabled
        } else if self.delivered_at.is_some() {
            TokenState::Delivered
        } else if self.redeemed_at.is_some() {
            TokenState::Redeemed
        } else if self.is_expired(now) {
            TokenState::Expired
        } else if self.revealed_at.is_some() {
            TokenState::Revealed
        } else {
            TokenState::Issued
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::prizes::Entity",
        from = "Column::PrizeId",
        to = "super::prizes::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Prize,
    #[sea_orm(
        belongs_to = "super::batches::Entity",
        from = "Column::BatchId",
        to = "super::batches::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Batch,
}

impl Related<super::prizes::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Prize.def()
    }
}

impl Related<super::batches::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample(now: DateTime<Utc>) -> Model {
        Model {
            id: "abc".into(),
            prize_id: 1,
            batch_id: 1,
            expires_at: now + Duration::days(1),
            signed_expires_at: now + Duration::days(1),
            signature: String::new(),
            signature_version: 1,
            disabled: false,
            available_from: None,
            revealed_at: None,
            delivered_at: None,
            redeemed_at: None,
            assigned_prize_id: None,
            paired_next_token_id: None,
            reservation_id: None,
            created_at: Some(now),
        }
    }

    #[test]
    fn test_state_derivation() {
        let now = Utc::now();
        let mut t = sample(now);
        assert_eq!(t.state(now), TokenState::Issued);

        t.revealed_at = Some(now);
        assert_eq!(t.state(now), TokenState::Revealed);
        // 已 reveal 未交付，过期后视为 expired
        assert_eq!(t.state(now + Duration::days(2)), TokenState::Expired);

        t.delivered_at = Some(now);
        assert_eq!(t.state(now + Duration::days(2)), TokenState::Delivered);

        t.disabled = true;
        assert_eq!(t.state(now), TokenState::Disabled);
    }

    #[test]
    fn test_legacy_redeemed_counts_as_revealed_and_delivered() {
        let now = Utc::now();
        let mut t = sample(now);
        t.redeemed_at = Some(now);
        assert_eq!(t.state(now), TokenState::Redeemed);
        assert_eq!(t.effective_revealed_at(), Some(now));
        assert_eq!(t.effective_delivered_at(), Some(now));
        assert!(!t.is_active(now));
    }

    #[test]
    fn test_available_from_window() {
        let now = Utc::now();
        let mut t = sample(now);
        t.available_from = Some(now + Duration::minutes(30));
        assert!(!t.is_available(now));
        assert!(t.is_available(now + Duration::minutes(30)));
    }
}
