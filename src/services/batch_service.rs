use crate::entities::{batch_entity as batches, prize_entity as prizes, token_entity as tokens};
use crate::error::{AppError, AppResult};
use crate::models::{
    BatchResponse, GenerateMeta, GenerateOptions, GenerateResponse, GeneratedToken, PrizeRequest,
};
use crate::services::AuditLogService;
use crate::services::audit_log_service::STOCK_CONSUMED;
use crate::utils::{TokenSigner, derive_functional_date, generate_token_id};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter, Set, TransactionTrait,
};
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};

/// 测试专用：在条件扣减之前模拟另一个生成器抢先消耗库存。
/// 返回 Some(stock) 时会在同一事务内把库存改写为该值。
#[cfg(test)]
pub(crate) type StockInterference = std::sync::Arc<dyn Fn(i64) -> Option<i64> + Send + Sync>;

/// 每条 INSERT 的 token 行数上限。每行 16 个绑定参数，
/// 需低于 SQLite (32766) 与 Postgres (65535) 的参数上限。
const TOKEN_INSERT_CHUNK: usize = 1000;

/// 批量生成 token
///
/// 一次调用对应一个数据库事务：
/// 1. 创建批次并立即写入 functional_date
/// 2. 在事务内重新读取每个奖品的实时库存
/// 3. 为每个单位生成 token（随机 id、过期时间、签名）
/// 4. 分块批量插入
/// 5. 条件扣减库存 (WHERE stock >= n)，影响 0 行说明并发生成器已消耗库存，整体回滚
#[derive(Clone)]
pub struct BatchService {
    pool: DatabaseConnection,
    signer: TokenSigner,
    venue_offset: FixedOffset,
    audit_log: AuditLogService,
    #[cfg(test)]
    stock_interference: Option<StockInterference>,
}

/// 单个奖品的生成计划（已校验过期天数）
struct PrizePlan<'a> {
    request: &'a PrizeRequest,
    expiration_days: i64,
    ttl: Duration,
}

/// 事务内产出，提交后再组装响应与审计
struct Emission {
    prize: prizes::Model,
    tokens: Vec<tokens::Model>,
}

impl BatchService {
    pub fn new(pool: DatabaseConnection, signer: TokenSigner, venue_offset: FixedOffset) -> Self {
        let audit_log = AuditLogService::new(pool.clone());
        Self {
            pool,
            signer,
            venue_offset,
            audit_log,
            #[cfg(test)]
            stock_interference: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_stock_interference(mut self, hook: StockInterference) -> Self {
        self.stock_interference = Some(hook);
        self
    }

    /// 自动模式生成：每个奖品的发放数量等于事务时刻的全部剩余库存，
    /// 请求中的 count 只做记录。库存 <= 0、不受管理 (NULL) 或未启用的奖品跳过。
    pub async fn generate(
        &self,
        requests: &[PrizeRequest],
        options: &GenerateOptions,
    ) -> AppResult<GenerateResponse> {
        let plans = Self::validate(requests, options)?;

        let now = Utc::now();
        let txn = self.pool.begin().await?;

        let outcome = self.generate_in_txn(&txn, &plans, options, now).await;
        let (batch, emissions, skipped) = match outcome {
            Ok(v) => v,
            Err(e) => {
                txn.rollback().await?;
                return Err(e);
            }
        };

        txn.commit().await?;

        // 提交后写审计日志，日志不会拖住事务
        for emission in &emissions {
            let count = emission.tokens.len();
            self.audit_log
                .record(
                    STOCK_CONSUMED,
                    format!(
                        "Prize {} ({}) consumed {} units into batch {}",
                        emission.prize.id, emission.prize.key, count, batch.id
                    ),
                    json!({
                        "prize_id": emission.prize.id,
                        "prize_key": emission.prize.key,
                        "batch_id": batch.id,
                        "emitted": count,
                        "emitted_total": emission.prize.emitted_total + count as i64,
                    }),
                )
                .await;
        }

        let mut emitted_totals = BTreeMap::new();
        let mut generated = Vec::new();
        for emission in &emissions {
            emitted_totals.insert(emission.prize.id, emission.tokens.len() as i64);
            generated.extend(
                emission
                    .tokens
                    .iter()
                    .map(|t| GeneratedToken::new(t, &emission.prize)),
            );
        }

        log::info!(
            "Batch {} generated: {} tokens across {} prizes ({} skipped)",
            batch.id,
            generated.len(),
            emissions.len(),
            skipped.len()
        );

        let meta = GenerateMeta {
            mode: "auto".to_string(),
            requested_prizes: requests.len(),
            emitted_prizes: emissions.len(),
            skipped_prize_ids: skipped,
            total_tokens: generated.len(),
        };

        Ok(GenerateResponse {
            batch: BatchResponse::from(batch),
            tokens: generated,
            meta,
            emitted_totals,
        })
    }

    /// 回填历史批次缺失的 functional_date，返回更新数量
    pub async fn backfill_functional_dates(&self) -> AppResult<u64> {
        let missing = batches::Entity::find()
            .filter(batches::Column::FunctionalDate.is_null())
            .all(&self.pool)
            .await?;

        let mut updated = 0u64;
        for batch in missing {
            let date = derive_functional_date(
                batch.description.as_deref(),
                batch.created_at,
                self.venue_offset,
            );
            let result = batches::Entity::update_many()
                .col_expr(batches::Column::FunctionalDate, Expr::value(date))
                .filter(batches::Column::Id.eq(batch.id))
                .filter(batches::Column::FunctionalDate.is_null())
                .exec(&self.pool)
                .await?;
            updated += result.rows_affected;
        }
        if updated > 0 {
            log::info!("Backfilled functional date for {updated} batches");
        }
        Ok(updated)
    }

    // -----------------------------
    // 内部辅助方法
    // -----------------------------

    fn validate<'a>(
        requests: &'a [PrizeRequest],
        options: &GenerateOptions,
    ) -> AppResult<Vec<PrizePlan<'a>>> {
        if requests.is_empty() {
            return Err(AppError::ValidationError(
                "At least one prize request is required".into(),
            ));
        }
        if options.activation_delay_minutes.is_some_and(|m| m < 0) {
            return Err(AppError::ValidationError(
                "Activation delay must not be negative".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        if let Some(dup) = requests.iter().find(|r| !seen.insert(r.prize_id)) {
            return Err(AppError::ValidationError(format!(
                "Prize {} is listed more than once",
                dup.prize_id
            )));
        }

        requests
            .iter()
            .map(|request| {
                let days = request
                    .expiration_days
                    .or(options.default_expiration_days)
                    .unwrap_or(0);
                let invalid = AppError::InvalidExpiration {
                    prize_id: request.prize_id,
                    days,
                };
                if days <= 0 {
                    return Err(invalid);
                }
                let ttl = Duration::try_days(days).ok_or(invalid)?;
                Ok(PrizePlan {
                    request,
                    expiration_days: days,
                    ttl,
                })
            })
            .collect()
    }

    async fn generate_in_txn(
        &self,
        txn: &DatabaseTransaction,
        plans: &[PrizePlan<'_>],
        options: &GenerateOptions,
        now: DateTime<Utc>,
    ) -> AppResult<(batches::Model, Vec<Emission>, Vec<i64>)> {
        // 所有 prize_id 必须存在
        let requested_ids: BTreeSet<i64> = plans.iter().map(|p| p.request.prize_id).collect();
        let found: BTreeSet<i64> = prizes::Entity::find()
            .filter(prizes::Column::Id.is_in(requested_ids.iter().copied()))
            .all(txn)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if let Some(missing) = requested_ids.difference(&found).next() {
            return Err(AppError::PrizeNotFound(*missing));
        }

        let functional_date =
            derive_functional_date(options.description.as_deref(), now, self.venue_offset);
        let batch = batches::ActiveModel {
            description: Set(options.description.clone()),
            functional_date: Set(Some(functional_date)),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        let available_from = options
            .activation_delay_minutes
            .filter(|m| *m > 0)
            .and_then(Duration::try_minutes)
            .and_then(|delay| now.checked_add_signed(delay));

        let mut emissions = Vec::new();
        let mut skipped = Vec::new();

        for plan in plans {
            // 事务内重新读取实时库存，而不是使用事务前的快照
            let prize = prizes::Entity::find_by_id(plan.request.prize_id)
                .one(txn)
                .await?
                .ok_or(AppError::PrizeNotFound(plan.request.prize_id))?;

            let count = prize.drainable_stock();
            if count <= 0 {
                skipped.push(prize.id);
                continue;
            }
            if let Some(requested) = plan.request.count
                && requested != count
            {
                log::debug!(
                    "Prize {}: requested count {requested} ignored, draining stock {count}",
                    prize.id
                );
            }

            let expires_at =
                now.checked_add_signed(plan.ttl)
                    .ok_or(AppError::InvalidExpiration {
                        prize_id: prize.id,
                        days: plan.expiration_days,
                    })?;
            let mut rows = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let id = generate_token_id();
                let (signature, signature_version) =
                    self.signer.sign_token(&id, prize.id, expires_at)?;
                rows.push(tokens::Model {
                    id,
                    prize_id: prize.id,
                    batch_id: batch.id,
                    expires_at,
                    signed_expires_at: expires_at,
                    signature,
                    signature_version,
                    disabled: options.disabled,
                    available_from,
                    revealed_at: None,
                    delivered_at: None,
                    redeemed_at: None,
                    assigned_prize_id: None,
                    paired_next_token_id: None,
                    reservation_id: None,
                    created_at: Some(now),
                });
            }

            for chunk in rows.chunks(TOKEN_INSERT_CHUNK) {
                tokens::Entity::insert_many(chunk.iter().map(new_token_row))
                    .exec_without_returning(txn)
                    .await?;
            }

            #[cfg(test)]
            self.interfere(txn, prize.id).await?;

            // 条件扣减：WHERE stock >= n，未命中说明库存已被并发消耗
            let result = prizes::Entity::update_many()
                .col_expr(prizes::Column::Stock, Expr::value(0i64))
                .col_expr(
                    prizes::Column::EmittedTotal,
                    Expr::col(prizes::Column::EmittedTotal).add(count),
                )
                .col_expr(prizes::Column::LastEmittedAt, Expr::value(now))
                .col_expr(prizes::Column::UpdatedAt, Expr::value(now))
                .filter(prizes::Column::Id.eq(prize.id))
                .filter(prizes::Column::Stock.gte(count))
                .exec(txn)
                .await?;

            if result.rows_affected == 0 {
                log::warn!(
                    "Race detected on prize {}: stock changed before consuming {count} units",
                    prize.id
                );
                return Err(AppError::RaceCondition(prize.id));
            }

            emissions.push(Emission {
                prize,
                tokens: rows,
            });
        }

        Ok((batch, emissions, skipped))
    }

    #[cfg(test)]
    async fn interfere(&self, txn: &DatabaseTransaction, prize_id: i64) -> AppResult<()> {
        if let Some(hook) = &self.stock_interference
            && let Some(stock) = hook(prize_id)
        {
            prizes::Entity::update_many()
                .col_expr(prizes::Column::Stock, Expr::value(stock))
                .filter(prizes::Column::Id.eq(prize_id))
                .exec(txn)
                .await?;
        }
        Ok(())
    }
}

fn new_token_row(m: &tokens::Model) -> tokens::ActiveModel {
    tokens::ActiveModel {
        id: Set(m.id.clone()),
        prize_id: Set(m.prize_id),
        batch_id: Set(m.batch_id),
        expires_at: Set(m.expires_at),
        signed_expires_at: Set(m.signed_expires_at),
        signature: Set(m.signature.clone()),
        signature_version: Set(m.signature_version),
        disabled: Set(m.disabled),
        available_from: Set(m.available_from),
        revealed_at: Set(None),
        delivered_at: Set(None),
        redeemed_at: Set(None),
        assigned_prize_id: Set(None),
        paired_next_token_id: Set(None),
        reservation_id: Set(m.reservation_id),
        created_at: Set(m.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PrizeKind, event_log_entity as event_logs};
    use crate::test_support::*;
    use sea_orm::{IntoActiveModel, PaginatorTrait};
    use std::sync::Arc;

    fn request(prize_id: i64, days: i64) -> PrizeRequest {
        PrizeRequest {
            prize_id,
            count: None,
            expiration_days: Some(days),
        }
    }

    async fn service() -> (DatabaseConnection, BatchService) {
        let db = setup_db().await;
        let svc = BatchService::new(db.clone(), test_signer(), venue_offset());
        (db, svc)
    }

    async fn prize(db: &DatabaseConnection, id: i64) -> prizes::Model {
        prizes::Entity::find_by_id(id).one(db).await.unwrap().unwrap()
    }

    async fn token_count(db: &DatabaseConnection, prize_id: i64) -> u64 {
        tokens::Entity::find()
            .filter(tokens::Column::PrizeId.eq(prize_id))
            .count(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_generate_drains_entire_stock() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "champagne", PrizeKind::Standard, Some(3)).await;

        let result = svc
            .generate(&[request(p.id, 7)], &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.tokens.len(), 3);
        assert_eq!(result.emitted_totals.get(&p.id), Some(&3));
        assert_eq!(result.meta.mode, "auto");
        assert!(result.batch.functional_date.is_some());
        assert!(result.tokens.iter().all(|t| t.prize_key == "champagne"));

        let after = prize(&db, p.id).await;
        assert_eq!(after.stock, Some(0));
        assert_eq!(after.emitted_total, 3);
        assert!(after.last_emitted_at.is_some());

        // 签名可用签名器校验
        let signer = test_signer();
        for row in tokens::Entity::find().all(&db).await.unwrap() {
            assert!(signer.verify_token(&row));
            assert_eq!(row.batch_id, result.batch.id);
        }

        // 库存已为 0，再次生成不产生任何 token
        let again = svc
            .generate(&[request(p.id, 7)], &GenerateOptions::default())
            .await
            .unwrap();
        assert!(again.tokens.is_empty());
        assert_eq!(again.meta.skipped_prize_ids, vec![p.id]);
        assert_eq!(token_count(&db, p.id).await, 3);
        assert_eq!(prize(&db, p.id).await.emitted_total, 3);
    }

    #[tokio::test]
    async fn test_large_stock_is_inserted_in_chunks() {
        let (db, svc) = service().await;
        let stock = 2 * TOKEN_INSERT_CHUNK as i64 + 500;
        let p = seed_prize(&db, "pitcher", PrizeKind::Standard, Some(stock)).await;

        let result = svc
            .generate(&[request(p.id, 7)], &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.tokens.len() as i64, stock);
        assert_eq!(result.emitted_totals.get(&p.id), Some(&stock));
        assert_eq!(token_count(&db, p.id).await as i64, stock);
        let after = prize(&db, p.id).await;
        assert_eq!(after.stock, Some(0));
        assert_eq!(after.emitted_total, stock);
    }

    #[tokio::test]
    async fn test_duplicate_prize_ids_rejected() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "double", PrizeKind::Standard, Some(3)).await;

        let err = svc
            .generate(&[request(p.id, 1), request(p.id, 2)], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(prize(&db, p.id).await.stock, Some(3));
        assert_eq!(batches::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_requested_count_is_ignored_in_auto_mode() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "shot", PrizeKind::Standard, Some(4)).await;

        let req = PrizeRequest {
            prize_id: p.id,
            count: Some(1),
            expiration_days: Some(1),
        };
        let result = svc.generate(&[req], &GenerateOptions::default()).await.unwrap();
        assert_eq!(result.tokens.len(), 4);
    }

    #[tokio::test]
    async fn test_skips_unmanaged_empty_and_inactive_prizes() {
        let (db, svc) = service().await;
        let unlimited = seed_prize(&db, "unlimited", PrizeKind::Standard, None).await;
        let empty = seed_prize(&db, "empty", PrizeKind::Standard, Some(0)).await;
        let inactive = seed_prize(&db, "inactive", PrizeKind::Standard, Some(5)).await;
        let mut am = inactive.clone().into_active_model();
        am.is_active = Set(false);
        am.update(&db).await.unwrap();

        let result = svc
            .generate(
                &[
                    request(unlimited.id, 1),
                    request(empty.id, 1),
                    request(inactive.id, 1),
                ],
                &GenerateOptions::default(),
            )
            .await
            .unwrap();

        assert!(result.tokens.is_empty());
        assert_eq!(result.meta.skipped_prize_ids.len(), 3);
        assert_eq!(prize(&db, inactive.id).await.stock, Some(5));
    }

    #[tokio::test]
    async fn test_unknown_prize_aborts_whole_call() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "vip", PrizeKind::Standard, Some(2)).await;

        let err = svc
            .generate(&[request(p.id, 1), request(9999, 1)], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PrizeNotFound(9999)));

        assert_eq!(prize(&db, p.id).await.stock, Some(2));
        assert_eq!(batches::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_expiration_rejected() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "vip", PrizeKind::Standard, Some(2)).await;

        let err = svc
            .generate(&[request(p.id, 0)], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidExpiration { days: 0, .. }));

        // 请求缺省时回落到 default_expiration_days
        let req = PrizeRequest {
            prize_id: p.id,
            count: None,
            expiration_days: None,
        };
        let err = svc
            .generate(std::slice::from_ref(&req), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidExpiration { .. }));

        let options = GenerateOptions {
            default_expiration_days: Some(3),
            ..Default::default()
        };
        let result = svc.generate(&[req], &options).await.unwrap();
        assert_eq!(result.tokens.len(), 2);

        let err = svc.generate(&[], &options).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_race_rolls_back_every_prize_in_call() {
        let (db, svc) = service().await;
        let a = seed_prize(&db, "a", PrizeKind::Standard, Some(2)).await;
        let b = seed_prize(&db, "b", PrizeKind::Standard, Some(5)).await;

        let target = b.id;
        let svc = svc.with_stock_interference(Arc::new(move |prize_id| {
            (prize_id == target).then_some(1)
        }));

        let err = svc
            .generate(&[request(a.id, 1), request(b.id, 1)], &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RaceCondition(id) if id == b.id));
        assert!(err.is_retryable());

        let a_after = prize(&db, a.id).await;
        assert_eq!(a_after.stock, Some(2));
        assert_eq!(a_after.emitted_total, 0);
        assert_eq!(prize(&db, b.id).await.stock, Some(5));
        assert_eq!(tokens::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(batches::Entity::find().count(&db).await.unwrap(), 0);
        assert_eq!(event_logs::Entity::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_back_to_back_generates_never_over_issue() {
        // 测试库只有一个连接，两次调用会依次执行：后一次看到的库存为 0。
        // 条件扣减真正判定竞争的情形见 test_race_rolls_back_every_prize_in_call。
        let (db, svc) = service().await;
        let p = seed_prize(&db, "bottle", PrizeKind::Standard, Some(10)).await;
        let reqs = [request(p.id, 1)];
        let options = GenerateOptions::default();

        let (first, second) = tokio::join!(
            svc.generate(&reqs, &options),
            svc.generate(&reqs, &options)
        );

        let emitted: usize = [first, second]
            .into_iter()
            .map(|r| match r {
                Ok(res) => res.tokens.len(),
                Err(AppError::RaceCondition(_)) => 0,
                Err(e) => panic!("unexpected error: {e}"),
            })
            .sum();
        assert_eq!(emitted, 10);
        assert_eq!(token_count(&db, p.id).await, 10);
        assert_eq!(prize(&db, p.id).await.emitted_total, 10);
    }

    #[tokio::test]
    async fn test_emitted_total_accumulates_across_restocks() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "restock", PrizeKind::Standard, Some(3)).await;
        svc.generate(&[request(p.id, 1)], &GenerateOptions::default())
            .await
            .unwrap();

        // 管理员补货（带条件的写入由外部工具负责，这里直接改）
        let mut am = prize(&db, p.id).await.into_active_model();
        am.stock = Set(Some(4));
        am.update(&db).await.unwrap();

        svc.generate(&[request(p.id, 1)], &GenerateOptions::default())
            .await
            .unwrap();

        let after = prize(&db, p.id).await;
        assert_eq!(after.emitted_total, 7);
        assert_eq!(after.stock, Some(0));
    }

    #[tokio::test]
    async fn test_audit_entry_per_emitting_prize() {
        let (db, svc) = service().await;
        let a = seed_prize(&db, "a", PrizeKind::Standard, Some(1)).await;
        let b = seed_prize(&db, "b", PrizeKind::Standard, Some(0)).await;

        svc.generate(&[request(a.id, 1), request(b.id, 1)], &GenerateOptions::default())
            .await
            .unwrap();

        let logs = event_logs::Entity::find().all(&db).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, STOCK_CONSUMED);
        assert_eq!(
            logs[0].metadata.as_ref().unwrap()["prize_id"],
            serde_json::json!(a.id)
        );
    }

    #[tokio::test]
    async fn test_options_set_activation_window_and_disabled() {
        let (db, svc) = service().await;
        let p = seed_prize(&db, "late", PrizeKind::Standard, Some(2)).await;

        let options = GenerateOptions {
            description: Some("Noche 07.11.2025".into()),
            activation_delay_minutes: Some(30),
            disabled: true,
            ..Default::default()
        };
        let result = svc.generate(&[request(p.id, 1)], &options).await.unwrap();

        assert_eq!(
            result.batch.functional_date,
            chrono::NaiveDate::from_ymd_opt(2025, 11, 7)
        );
        for t in &result.tokens {
            assert!(t.disabled);
            let from = t.available_from.unwrap();
            assert!(from > result.batch.created_at + Duration::minutes(29));
        }
    }

    #[tokio::test]
    async fn test_backfill_functional_dates() {
        let (db, svc) = service().await;
        let batch = seed_batch(&db).await;
        assert!(batch.functional_date.is_none());

        assert_eq!(svc.backfill_functional_dates().await.unwrap(), 1);
        let after = batches::Entity::find_by_id(batch.id).one(&db).await.unwrap().unwrap();
        assert!(after.functional_date.is_some());
        assert_eq!(svc.backfill_functional_dates().await.unwrap(), 0);
    }
}
