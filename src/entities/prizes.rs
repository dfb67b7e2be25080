use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// 奖品类型
/// - standard: 实际奖品
/// - retry: “再来一次”，可通过 paired_next_token_id 串到下一张实际奖品 token
/// - lose: 未中奖占位
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema, DeriveActiveEnum, EnumIter,
)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
#[serde(rename_all = "snake_case")]
pub enum PrizeKind {
    #[sea_orm(string_value = "standard")]
    Standard,
    #[sea_orm(string_value = "retry")]
    Retry,
    #[sea_orm(string_value = "lose")]
    Lose,
}

impl std::fmt::Display for PrizeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrizeKind::Standard => write!(f, "standard"),
            PrizeKind::Retry => write!(f, "retry"),
            PrizeKind::Lose => write!(f, "lose"),
        }
    }
}

/// 奖品 + 库存台账
/// - stock: 当前库存 (NULL 表示不受管理, 不参与生成)
/// - emitted_total: 累计已发放 token 数, 只增不减
/// - 库存字段只能通过带条件的 UPDATE 修改 (WHERE stock >= n)
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "prizes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// 唯一标识
    #[sea_orm(unique)]
    pub key: String,
    /// 展示名称
    pub label: String,
    pub color: Option<String>,
    pub kind: PrizeKind,
    pub stock: Option<i64>,
    pub emitted_total: i64,
    pub last_emitted_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    /// 本次生成可消耗的库存数量（自动模式：全部剩余库存）
    pub fn drainable_stock(&self) -> i64 {
        if !self.is_active {
            return 0;
        }
        self.stock.unwrap_or(0).max(0)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tokens::Entity")]
    Tokens,
}

impl Related<super::tokens::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
