use crate::entities::{prize_entity as prizes, token_entity as tokens};
use crate::error::{AppError, AppResult, TransitionReason};
use crate::models::{RedemptionTimestamps, RevealResponse, RevealedPrize, TokenStatusResponse};
use crate::utils::TokenSigner;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

/// 兑换状态机
///
/// ISSUED -> REVEALED -> DELIVERED（两阶段）
/// ISSUED -> REDEEMED（旧版一阶段，等价于 revealed = delivered = redeemed_at）
/// EXPIRED 为派生状态；DISABLED 为终态，优先于其它一切迁移。
///
/// 每次迁移先校验签名，再以“目标字段当前为空”为条件做 UPDATE，
/// 并发请求只会有一个成功打上时间戳。
#[derive(Clone)]
pub struct RedemptionService {
    pool: DatabaseConnection,
    signer: TokenSigner,
}

impl RedemptionService {
    pub fn new(pool: DatabaseConnection, signer: TokenSigner) -> Self {
        Self { pool, signer }
    }

    /// 持有人查看奖品。奖品在发放时已确定，这里只是揭晓。
    /// 已 reveal 的 token 重复调用返回同一奖品，不会重新打时间戳。
    pub async fn reveal(&self, token_id: &str) -> AppResult<RevealResponse> {
        let now = Utc::now();
        let token = self.load_verified(token_id).await?;

        if token.disabled {
            return Err(AppError::invalid_transition(token_id, TransitionReason::Disabled));
        }
        if let Some(revealed_at) = token.effective_revealed_at() {
            return self.revealed(&token, revealed_at, true).await;
        }
        check_reveal(&token, now).map_err(|r| AppError::invalid_transition(token_id, r))?;

        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::RevealedAt, Expr::value(now))
            .col_expr(tokens::Column::AssignedPrizeId, Expr::value(token.prize_id))
            .filter(tokens::Column::Id.eq(token_id))
            .filter(tokens::Column::RevealedAt.is_null())
            .filter(tokens::Column::RedeemedAt.is_null())
            .filter(tokens::Column::Disabled.eq(false))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            // 并发请求抢先完成了迁移（或 token 刚被禁用）
            let current = self.load(token_id).await?;
            if current.disabled {
                return Err(AppError::invalid_transition(token_id, TransitionReason::Disabled));
            }
            return match current.effective_revealed_at() {
                Some(revealed_at) => self.revealed(&current, revealed_at, true).await,
                None => Err(AppError::InternalError(format!(
                    "Reveal of token {token_id} affected no rows"
                ))),
            };
        }

        log::info!("Token {token_id} revealed (prize {})", token.prize_id);
        self.revealed(&token, now, false).await
    }

    /// 员工确认实物交付。要求已 reveal、未交付、未禁用、未过期。
    pub async fn deliver(&self, token_id: &str) -> AppResult<RedemptionTimestamps> {
        let now = Utc::now();
        let token = self.load_verified(token_id).await?;
        check_deliver(&token, now).map_err(|r| AppError::invalid_transition(token_id, r))?;

        // 交付即视为已兑换，同时补写 redeemed_at 以兼容旧报表
        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::DeliveredAt, Expr::value(now))
            .col_expr(tokens::Column::RedeemedAt, Expr::value(now))
            .filter(tokens::Column::Id.eq(token_id))
            .filter(tokens::Column::RevealedAt.is_not_null())
            .filter(tokens::Column::DeliveredAt.is_null())
            .filter(tokens::Column::RedeemedAt.is_null())
            .filter(tokens::Column::Disabled.eq(false))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            let current = self.load(token_id).await?;
            let reason = check_deliver(&current, now)
                .err()
                .unwrap_or(TransitionReason::AlreadyDelivered);
            return Err(AppError::invalid_transition(token_id, reason));
        }

        log::info!("Token {token_id} delivered");
        Ok(RedemptionTimestamps {
            token_id: token_id.to_string(),
            revealed_at: token.revealed_at.unwrap_or(now),
            delivered_at: now,
            redeemed_at: Some(now),
        })
    }

    /// 旧版一阶段兑换：同一时刻写入 revealed_at / delivered_at / redeemed_at
    pub async fn redeem(&self, token_id: &str) -> AppResult<RedemptionTimestamps> {
        let now = Utc::now();
        let token = self.load_verified(token_id).await?;
        check_redeem(&token, now).map_err(|r| AppError::invalid_transition(token_id, r))?;

        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::RevealedAt, Expr::value(now))
            .col_expr(tokens::Column::DeliveredAt, Expr::value(now))
            .col_expr(tokens::Column::RedeemedAt, Expr::value(now))
            .col_expr(tokens::Column::AssignedPrizeId, Expr::value(token.prize_id))
            .filter(tokens::Column::Id.eq(token_id))
            .filter(tokens::Column::RevealedAt.is_null())
            .filter(tokens::Column::DeliveredAt.is_null())
            .filter(tokens::Column::RedeemedAt.is_null())
            .filter(tokens::Column::Disabled.eq(false))
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            let current = self.load(token_id).await?;
            let reason = check_redeem(&current, now)
                .err()
                .unwrap_or(TransitionReason::AlreadyRedeemed);
            return Err(AppError::invalid_transition(token_id, reason));
        }

        log::info!("Token {token_id} redeemed (legacy one-phase)");
        Ok(RedemptionTimestamps {
            token_id: token_id.to_string(),
            revealed_at: now,
            delivered_at: now,
            redeemed_at: Some(now),
        })
    }

    /// 单向禁用（管理员操作），重复调用无副作用
    pub async fn disable(&self, token_id: &str) -> AppResult<TokenStatusResponse> {
        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::Disabled, Expr::value(true))
            .filter(tokens::Column::Id.eq(token_id))
            .filter(tokens::Column::Disabled.eq(false))
            .exec(&self.pool)
            .await?;
        if result.rows_affected > 0 {
            log::info!("Token {token_id} disabled");
        }
        self.status(token_id).await
    }

    pub async fn status(&self, token_id: &str) -> AppResult<TokenStatusResponse> {
        let token = self.load(token_id).await?;
        let valid = self.signer.verify_token(&token);
        Ok(TokenStatusResponse::new(token, valid, Utc::now()))
    }

    /// 将旧版一阶段数据收敛为两阶段形态：
    /// revealed_at = delivered_at = redeemed_at，assigned_prize_id 缺失时取 prize_id
    pub async fn backfill_two_phase(&self) -> AppResult<u64> {
        let result = tokens::Entity::update_many()
            .col_expr(
                tokens::Column::RevealedAt,
                Expr::col(tokens::Column::RedeemedAt).into(),
            )
            .col_expr(
                tokens::Column::DeliveredAt,
                coalesce(tokens::Column::DeliveredAt, tokens::Column::RedeemedAt),
            )
            .col_expr(
                tokens::Column::AssignedPrizeId,
                coalesce(tokens::Column::AssignedPrizeId, tokens::Column::PrizeId),
            )
            .filter(tokens::Column::RedeemedAt.is_not_null())
            .filter(tokens::Column::RevealedAt.is_null())
            .exec(&self.pool)
            .await?;

        if result.rows_affected > 0 {
            log::info!(
                "Backfilled {} legacy tokens into two-phase shape",
                result.rows_affected
            );
        }
        Ok(result.rows_affected)
    }

    // -----------------------------
    // 内部辅助方法
    // -----------------------------

    async fn load(&self, token_id: &str) -> AppResult<tokens::Model> {
        tokens::Entity::find_by_id(token_id.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::TokenNotFound(token_id.to_string()))
    }

    async fn load_verified(&self, token_id: &str) -> AppResult<tokens::Model> {
        let token = self.load(token_id).await?;
        if !self.signer.verify_token(&token) {
            log::warn!(
                "Signature mismatch for token {token_id} (version {})",
                token.signature_version
            );
            return Err(AppError::SignatureMismatch(token_id.to_string()));
        }
        Ok(token)
    }

    async fn revealed(
        &self,
        token: &tokens::Model,
        revealed_at: DateTime<Utc>,
        already_revealed: bool,
    ) -> AppResult<RevealResponse> {
        let prize_id = token.assigned_prize_id.unwrap_or(token.prize_id);
        let prize = prizes::Entity::find_by_id(prize_id)
            .one(&self.pool)
            .await?
            .ok_or(AppError::PrizeNotFound(prize_id))?;
        Ok(RevealResponse {
            token_id: token.id.clone(),
            prize: RevealedPrize::from(prize),
            revealed_at,
            already_revealed,
        })
    }
}

fn coalesce(first: tokens::Column, second: tokens::Column) -> SimpleExpr {
    Func::coalesce([Expr::col(first).into(), Expr::col(second).into()]).into()
}

/// reveal 的前置条件（不含“已 reveal”，该情况按幂等读取处理）
pub fn check_reveal(token: &tokens::Model, now: DateTime<Utc>) -> Result<(), TransitionReason> {
    if token.disabled {
        return Err(TransitionReason::Disabled);
    }
    if token.effective_revealed_at().is_some() {
        return Err(TransitionReason::AlreadyRevealed);
    }
    if !token.is_available(now) {
        return Err(TransitionReason::NotYetAvailable);
    }
    if token.is_expired(now) {
        return Err(TransitionReason::Expired);
    }
    Ok(())
}

pub fn check_deliver(token: &tokens::Model, now: DateTime<Utc>) -> Result<(), TransitionReason> {
    if token.disabled {
        return Err(TransitionReason::Disabled);
    }
    if token.delivered_at.is_some() {
        return Err(TransitionReason::AlreadyDelivered);
    }
    if token.redeemed_at.is_some() {
        return Err(TransitionReason::AlreadyRedeemed);
    }
    if token.revealed_at.is_none() {
        return Err(TransitionReason::NotRevealed);
    }
    if token.is_expired(now) {
        return Err(TransitionReason::Expired);
    }
    Ok(())
}

pub fn check_redeem(token: &tokens::Model, now: DateTime<Utc>) -> Result<(), TransitionReason> {
    if token.disabled {
        return Err(TransitionReason::Disabled);
    }
    if token.redeemed_at.is_some() {
        return Err(TransitionReason::AlreadyRedeemed);
    }
    if token.delivered_at.is_some() {
        return Err(TransitionReason::AlreadyDelivered);
    }
    if token.revealed_at.is_some() {
        return Err(TransitionReason::AlreadyRevealed);
    }
    if !token.is_available(now) {
        return Err(TransitionReason::NotYetAvailable);
    }
    if token.is_expired(now) {
        return Err(TransitionReason::Expired);
    }
    Ok(())
}
