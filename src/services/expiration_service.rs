use crate::config::VenueConfig;
use crate::entities::{reservation_entity as reservations, token_entity as tokens};
use crate::error::{AppError, AppResult};
use crate::models::ExpirationUpdate;
use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};

/// 到场事件驱动的过期时间重算
/// 新过期时间 = 主人到场时间 + 配置分钟数（场地时间计算，转回 UTC，截断到秒）
#[derive(Clone)]
pub struct ExpirationService {
    pool: DatabaseConnection,
    venue: VenueConfig,
}

impl ExpirationService {
    pub fn new(pool: DatabaseConnection, venue: VenueConfig) -> Self {
        Self { pool, venue }
    }

    /// 重算预订下所有 token 的 expires_at。尚未到场时返回 None，不做修改。
    /// 只写 expires_at，reveal/deliver/disabled 字段保持不变。
    pub async fn recalculate(&self, reservation_id: i64) -> AppResult<Option<ExpirationUpdate>> {
        let reservation = self.load(reservation_id).await?;
        let Some(arrived_at) = reservation.host_arrived_at else {
            log::debug!("Reservation {reservation_id} has no arrival yet, skipping");
            return Ok(None);
        };

        let new_expires_at = compute_expiration(
            arrived_at,
            self.venue.offset(),
            self.venue.arrival_expiration_minutes,
        )?;

        let result = tokens::Entity::update_many()
            .col_expr(tokens::Column::ExpiresAt, Expr::value(new_expires_at))
            .filter(tokens::Column::ReservationId.eq(reservation_id))
            .exec(&self.pool)
            .await?;

        log::info!(
            "Reservation {reservation_id}: {} tokens now expire at {new_expires_at}",
            result.rows_affected
        );
        Ok(Some(ExpirationUpdate {
            reservation_id,
            new_expires_at,
            tokens_updated: result.rows_affected,
        }))
    }

    /// 记录主人到场（只记录第一次），然后重算
    pub async fn record_arrival(
        &self,
        reservation_id: i64,
        arrived_at: Option<DateTime<Utc>>,
    ) -> AppResult<Option<ExpirationUpdate>> {
        let arrived_at = arrived_at.unwrap_or_else(Utc::now);

        let result = reservations::Entity::update_many()
            .col_expr(reservations::Column::HostArrivedAt, Expr::value(arrived_at))
            .filter(reservations::Column::Id.eq(reservation_id))
            .filter(reservations::Column::HostArrivedAt.is_null())
            .exec(&self.pool)
            .await?;

        if result.rows_affected == 0 {
            // 预订不存在会在 recalculate 中报 NotFound
            log::debug!("Reservation {reservation_id} arrival already recorded");
        }
        self.recalculate(reservation_id).await
    }

    /// 对所有已到场的预订补算一次
    pub async fn recalculate_all(&self) -> AppResult<Vec<ExpirationUpdate>> {
        let arrived = reservations::Entity::find()
            .filter(reservations::Column::HostArrivedAt.is_not_null())
            .order_by_asc(reservations::Column::Id)
            .all(&self.pool)
            .await?;

        let mut updates = Vec::with_capacity(arrived.len());
        for reservation in arrived {
            if let Some(update) = self.recalculate(reservation.id).await? {
                updates.push(update);
            }
        }
        Ok(updates)
    }

    async fn load(&self, reservation_id: i64) -> AppResult<reservations::Model> {
        reservations::Entity::find_by_id(reservation_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation {reservation_id}")))
    }
}

/// 在场地时区中加上分钟数并截断到整秒，再转回 UTC
pub fn compute_expiration(
    arrived_at: DateTime<Utc>,
    offset: FixedOffset,
    minutes: i64,
) -> AppResult<DateTime<Utc>> {
    let overflow = || {
        AppError::ValidationError(format!("Arrival offset of {minutes} minutes is out of range"))
    };
    let local = arrived_at.with_timezone(&offset);
    let delta = Duration::try_minutes(minutes).ok_or_else(overflow)?;
    let expires_local = local.checked_add_signed(delta).ok_or_else(overflow)?;
    let truncated = expires_local.with_nanosecond(0).unwrap_or(expires_local);
    Ok(truncated.with_timezone(&Utc))
}
