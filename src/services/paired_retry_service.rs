use crate::entities::{PrizeKind, prize_entity as prizes, token_entity as tokens};
use crate::error::{AppError, AppResult};
use crate::models::LinkPairRequest;
use crate::services::AuditLogService;
use chrono::Utc;
use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;

pub const PAIRED_TOKENS_DISABLED: &str = "paired tokens disabled";

/// “再来一次” token 与其链接的下一张 token
/// 当链接的是真实奖品且仍可 reveal 时，将其禁用
#[derive(Clone)]
pub struct PairedRetryService {
    pool: DatabaseConnection,
    audit_log: AuditLogService,
}

impl PairedRetryService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self {
            audit_log: AuditLogService::new(pool.clone()),
            pool,
        }
    }

    /// 扫描所有 retry token 的链接，返回本次禁用的 token 数。可重复执行。
    ///
    /// 候选集合完全在 SQL 子查询中求出，绑定参数数量与历史链接数无关。
    pub async fn invalidate_paired(&self) -> AppResult<u64> {
        let now = Utc::now();

        let retry_prizes = prize_ids_of_kind(PrizeKind::Retry);
        let paired_next = Query::select()
            .column(tokens::Column::PairedNextTokenId)
            .from(tokens::Entity)
            .and_where(tokens::Column::PrizeId.in_subquery(retry_prizes))
            .and_where(tokens::Column::PairedNextTokenId.is_not_null())
            .to_owned();

        // 仍可 reveal（未禁用、未揭晓、未兑换、未过期）且为实际奖品
        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::Disabled, Expr::value(true))
            .filter(tokens::Column::Id.in_subquery(paired_next))
            .filter(tokens::Column::PrizeId.in_subquery(prize_ids_of_kind(PrizeKind::Standard)))
            .filter(tokens::Column::Disabled.eq(false))
            .filter(tokens::Column::RevealedAt.is_null())
            .filter(tokens::Column::RedeemedAt.is_null())
            .filter(tokens::Column::ExpiresAt.gte(now))
            .exec(&self.pool)
            .await?;

        if result.rows_affected > 0 {
            log::info!("Disabled {} tokens paired with retry outcomes", result.rows_affected);
            self.audit_log
                .record(
                    PAIRED_TOKENS_DISABLED,
                    format!("{} paired tokens disabled", result.rows_affected),
                    json!({ "disabled_count": result.rows_affected, "swept_at": now }),
                )
                .await;
        }
        Ok(result.rows_affected)
    }

    /// 建立链接：第一张必须是 retry 奖品，不能指向自身，指针只能写入一次
    pub async fn link_pair(
        &self,
        retry_token_id: &str,
        next_token_id: &str,
    ) -> AppResult<LinkPairRequest> {
        if retry_token_id == next_token_id {
            return Err(AppError::ValidationError(
                "A token cannot be paired with itself".to_string(),
            ));
        }

        let retry = self.load(retry_token_id).await?;
        self.load(next_token_id).await?;

        let prize = prizes::Entity::find_by_id(retry.prize_id)
            .one(&self.pool)
            .await?
            .ok_or(AppError::PrizeNotFound(retry.prize_id))?;
        if prize.kind != PrizeKind::Retry {
            return Err(AppError::ValidationError(format!(
                "Token {retry_token_id} is not a retry outcome (prize kind {})",
                prize.kind
            )));
        }

        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::PairedNextTokenId, Expr::value(next_token_id))
            .filter(tokens::Column::Id.eq(retry_token_id))
            .filter(tokens::Column::PairedNextTokenId.is_null())
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            let current = self.load(retry_token_id).await?;
            if current.paired_next_token_id.as_deref() != Some(next_token_id) {
                return Err(AppError::ValidationError(format!(
                    "Token {retry_token_id} is already paired"
                )));
            }
        } else {
            log::info!("Token {retry_token_id} paired with {next_token_id}");
        }

        Ok(LinkPairRequest {
            retry_token_id: retry_token_id.to_string(),
            next_token_id: next_token_id.to_string(),
        })
    }

    async fn load(&self, token_id: &str) -> AppResult<tokens::Model> {
        tokens::Entity::find_by_id(token_id.to_string())
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::TokenNotFound(token_id.to_string()))
    }
}

fn prize_ids_of_kind(kind: PrizeKind) -> SelectStatement {
    Query::select()
        .column(prizes::Column::Id)
        .from(prizes::Entity)
        .and_where(prizes::Column::Kind.eq(kind))
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::event_log_entity as event_logs;
    use crate::services::RedemptionService;
    use crate::test_support::*;
    use chrono::Duration;
    use sea_orm::{PaginatorTrait, Set};

    struct Fixture {
        db: DatabaseConnection,
        svc: PairedRetryService,
        retry: prizes::Model,
        genuine: prizes::Model,
        lose: prizes::Model,
        batch_id: i64,
    }

    async fn fixture() -> Fixture {
        let db = setup_db().await;
        let retry = seed_prize(&db, "try-again", PrizeKind::Retry, None).await;
        let genuine = seed_prize(&db, "bottle", PrizeKind::Standard, None).await;
        let lose = seed_prize(&db, "no-luck", PrizeKind::Lose, None).await;
        let batch = seed_batch(&db).await;
        Fixture {
            svc: PairedRetryService::new(db.clone()),
            db,
            retry,
            genuine,
            lose,
            batch_id: batch.id,
        }
    }

    async fn token(f: &Fixture, prize_id: i64) -> tokens::Model {
        let tomorrow = Utc::now() + Duration::days(1);
        seed_token(&f.db, &test_signer(), prize_id, f.batch_id, tomorrow).await
    }

    async fn reload(f: &Fixture, id: &str) -> tokens::Model {
        tokens::Entity::find_by_id(id.to_string()).one(&f.db).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_invalidate_disables_active_genuine_pairs() {
        let f = fixture().await;
        let retry = token(&f, f.retry.id).await;
        let next = token(&f, f.genuine.id).await;
        f.svc.link_pair(&retry.id, &next.id).await.unwrap();

        assert_eq!(f.svc.invalidate_paired().await.unwrap(), 1);
        assert!(reload(&f, &next.id).await.disabled);
        assert!(!reload(&f, &retry.id).await.disabled);

        // 再次执行不会重复禁用
        assert_eq!(f.svc.invalidate_paired().await.unwrap(), 0);

        let logs = event_logs::Entity::find()
            .filter(event_logs::Column::Kind.eq(PAIRED_TOKENS_DISABLED))
            .count(&f.db)
            .await
            .unwrap();
        assert_eq!(logs, 1);
    }

    #[tokio::test]
    async fn test_invalidate_skips_non_genuine_and_used_pairs() {
        let f = fixture().await;
        let redemption = RedemptionService::new(f.db.clone(), test_signer());

        let r1 = token(&f, f.retry.id).await;
        let lose_next = token(&f, f.lose.id).await;
        f.svc.link_pair(&r1.id, &lose_next.id).await.unwrap();

        let r2 = token(&f, f.retry.id).await;
        let revealed_next = token(&f, f.genuine.id).await;
        f.svc.link_pair(&r2.id, &revealed_next.id).await.unwrap();
        redemption.reveal(&revealed_next.id).await.unwrap();

        let r3 = token(&f, f.retry.id).await;
        let expired_next = seed_token(
            &f.db,
            &test_signer(),
            f.genuine.id,
            f.batch_id,
            Utc::now() - Duration::minutes(1),
        )
        .await;
        f.svc.link_pair(&r3.id, &expired_next.id).await.unwrap();

        // 非 retry token 的链接会被拒绝，自然也不参与扫描
        let unpaired = token(&f, f.genuine.id).await;

        assert_eq!(f.svc.invalidate_paired().await.unwrap(), 0);
        for id in [&lose_next.id, &revealed_next.id, &expired_next.id, &unpaired.id] {
            assert!(!reload(&f, id).await.disabled);
        }
    }

    #[tokio::test]
    async fn test_invalidate_with_pair_history_beyond_bind_limit() {
        let f = fixture().await;
        let tomorrow = Utc::now() + Duration::days(1);

        // 33,000 条历史链接，指向已不存在的 token
        let history: Vec<tokens::ActiveModel> = (0..33_000)
            .map(|i| tokens::ActiveModel {
                id: Set(format!("retry-{i}")),
                prize_id: Set(f.retry.id),
                batch_id: Set(f.batch_id),
                expires_at: Set(tomorrow),
                signed_expires_at: Set(tomorrow),
                signature: Set("unsigned".to_string()),
                signature_version: Set(2),
                disabled: Set(false),
                available_from: Set(None),
                revealed_at: Set(None),
                delivered_at: Set(None),
                redeemed_at: Set(None),
                assigned_prize_id: Set(None),
                paired_next_token_id: Set(Some(format!("gone-{i}"))),
                reservation_id: Set(None),
                created_at: Set(Some(Utc::now())),
            })
            .collect();
        for chunk in history.chunks(1000) {
            tokens::Entity::insert_many(chunk.to_vec())
                .exec_without_returning(&f.db)
                .await
                .unwrap();
        }

        let retry = token(&f, f.retry.id).await;
        let next = token(&f, f.genuine.id).await;
        f.svc.link_pair(&retry.id, &next.id).await.unwrap();

        assert_eq!(f.svc.invalidate_paired().await.unwrap(), 1);
        assert!(reload(&f, &next.id).await.disabled);
    }

    #[tokio::test]
    async fn test_link_pair_rules() {
        let f = fixture().await;
        let retry = token(&f, f.retry.id).await;
        let next = token(&f, f.genuine.id).await;
        let other = token(&f, f.genuine.id).await;

        let err = f.svc.link_pair(&retry.id, &retry.id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = f.svc.link_pair(&next.id, &other.id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let err = f.svc.link_pair(&retry.id, "missing").await.unwrap_err();
        assert!(matches!(err, AppError::TokenNotFound(_)));

        f.svc.link_pair(&retry.id, &next.id).await.unwrap();
        // 同一链接重复写入视为成功
        f.svc.link_pair(&retry.id, &next.id).await.unwrap();

        let err = f.svc.link_pair(&retry.id, &other.id).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(
            reload(&f, &retry.id).await.paired_next_token_id.as_deref(),
            Some(next.id.as_str())
        );
    }
}
